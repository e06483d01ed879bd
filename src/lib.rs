// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::match_like_matches_macro)]

//! # PDF Lexis
//!
//! Low-level, fault-tolerant reader for the PDF object syntax.
//!
//! ## Layers
//!
//! - **Tokenizer** ([`lexer`]): bytes to tokens, with escape decoding for
//!   literal strings, hex strings and names
//! - **Object assembler** ([`parser`]): an explicit-stack automaton that
//!   turns tokens into objects, recovering from missing `endobj`, bad
//!   nesting and truncation
//! - **Stream extractor** ([`stream`]): finds stream payloads by declared
//!   `/Length` when it can be trusted, by scanning for `endstream` otherwise
//! - **Cross-reference resolver** ([`xref`], [`document`]): classic tables,
//!   cross-reference streams, `/Prev` chains and reconstruction by scanning
//!
//! Objects are loaded lazily through a [`directory::Library`]; typed views
//! for catalogs, pages, fonts and friends live in [`typed`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_lexis::Document;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = Document::open("paper.pdf")?;
//! let catalog = doc.catalog()?;
//! if let Some(pages) = catalog.as_typed().and_then(|t| t.as_catalog()).and_then(|c| c.pages()) {
//!     let tree = doc.resolve(pages)?;
//!     println!("{:?}", tree.as_dict().and_then(|d| d.get("Count")));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Malformed input is recovered from silently wherever possible; the
//! recoveries are recorded as [`error::ParseIssue`]s and logged through the
//! `log` facade.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Byte sources
pub mod source;

// Core object syntax
pub mod lexer;
pub mod object;
pub mod parser;
/// Parser configuration options
pub mod parser_config;
pub mod stream;

// Specialized objects
pub mod factory;
pub mod typed;

// Cross-reference handling and object access
pub mod directory;
pub mod document;
pub mod objstm;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Re-exports
pub use directory::{Detached, Library, ObjectDirectory};
pub use document::Document;
pub use error::{Error, ParseIssue, Result};
pub use object::{Object, ObjectRef};
pub use parser::{Parsed, Parser};
pub use parser_config::ParserOptions;
