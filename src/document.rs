//! Document loading.
//!
//! Ties the reader together: header, cross-reference chain, trailer and an
//! object [`Library`] for lazy access. Random-access inputs follow the
//! `startxref` chain; streaming inputs are read once in file order.

use crate::directory::{Detached, Library, ObjectDirectory};
use crate::error::{Error, ParseIssue, Result};
use crate::object::{Object, ObjectRef};
use crate::objstm;
use crate::parser::{Parsed, Parser};
use crate::parser_config::ParserOptions;
use crate::source::{ReaderSource, SharedFile, SourceHandle};
use crate::typed::ObjectKind;
use crate::xref::{find_xref_offset, CrossRefTable, Trailer};
use crate::xref_reconstruction::reconstruct_xref;
use bytes::Bytes;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1};
use nom::sequence::{preceded, separated_pair};
use nom::IResult;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// How far into the input the `%PDF-` marker may appear.
const HEADER_WINDOW: u64 = 1024;

/// Version assumed when the header is missing.
const DEFAULT_VERSION: (u8, u8) = (1, 4);

fn header_version(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    preceded(tag("%PDF-"), separated_pair(digit1, char('.'), digit1))(input)
}

/// Find `%PDF-M.m` in the first bytes of the input.
///
/// Leading garbage before the marker is tolerated.
pub fn parse_header(head: &[u8]) -> Option<(u8, u8)> {
    let at = head.windows(5).position(|w| w == b"%PDF-")?;
    let (_, (major, minor)) = header_version(&head[at..]).ok()?;
    let major = std::str::from_utf8(major).ok()?.parse().ok()?;
    let minor = std::str::from_utf8(minor).ok()?.parse().ok()?;
    Some((major, minor))
}

fn checked_version(head: &[u8], options: &ParserOptions) -> Result<(u8, u8)> {
    match parse_header(head) {
        Some(version) => Ok(version),
        None if options.strict => {
            let shown = String::from_utf8_lossy(&head[..head.len().min(16)]).into_owned();
            Err(Error::InvalidHeader(shown))
        },
        None => {
            log::warn!("No %PDF- header found; assuming {}.{}", DEFAULT_VERSION.0, DEFAULT_VERSION.1);
            Ok(DEFAULT_VERSION)
        },
    }
}

/// Read one cross-reference section and its trailer at `offset`.
///
/// Classic sections come back as a trailer holding the table; for a
/// cross-reference stream the trailer is the stream dictionary.
fn read_section(handle: &SourceHandle, offset: u64, options: &ParserOptions) -> Result<Trailer> {
    if offset >= handle.len() {
        log::warn!("Cross-reference offset {} is past the end of input", offset);
        return Err(Error::InvalidXref);
    }

    let mut parser = Parser::with_options(handle.cursor_at(offset), *options);
    match parser.next_object(&mut Detached)? {
        Some(Parsed::Direct(Object::Trailer(trailer))) => Ok(*trailer),
        Some(Parsed::Direct(Object::CrossReference(table))) => {
            log::warn!("Cross-reference section at {} has no trailer", offset);
            Ok(Trailer {
                dict: Default::default(),
                xref: Some(table),
            })
        },
        Some(Parsed::Indirect(obj)) => match obj.object {
            Object::Trailer(trailer) => Ok(*trailer),
            other => {
                log::warn!(
                    "Object {} at cross-reference offset {} is a {}",
                    obj.reference,
                    offset,
                    other.type_name()
                );
                Err(Error::InvalidXref)
            },
        },
        _ => Err(Error::InvalidXref),
    }
}

/// Follow the cross-reference chain from `startxref` through `/Prev`.
///
/// Newer sections override older ones. The returned trailer is the newest
/// trailer overlaid with keys only older trailers define.
fn load_xref_chain(handle: &SourceHandle, options: &ParserOptions) -> Result<(CrossRefTable, Trailer)> {
    let mut offset = find_xref_offset(handle)?;
    let mut visited = HashSet::new();
    let mut table = CrossRefTable::new();
    let mut trailer: Option<Trailer> = None;

    loop {
        if !visited.insert(offset) {
            log::warn!("Cross-reference chain loops back to offset {}", offset);
            break;
        }
        if visited.len() > options.max_xref_chain {
            log::warn!("Cross-reference chain longer than {} sections", options.max_xref_chain);
            break;
        }

        let section = match read_section(handle, offset, options) {
            Ok(section) => section,
            Err(e) if trailer.is_none() || options.strict || e.is_io() => return Err(e),
            Err(e) => {
                log::warn!("Ignoring unreadable older section at {}: {}", offset, e);
                break;
            },
        };
        log::debug!("Read cross-reference section at offset {}", offset);

        let mut section_table = section.xref.clone().unwrap_or_default();
        // Hybrid files: the stream's entries take precedence over the
        // classic section they accompany
        if let Some(stm_offset) = section.xref_stm() {
            match read_section(handle, stm_offset, options) {
                Ok(stm) => {
                    let mut stm_table = stm.xref.unwrap_or_default();
                    stm_table.merge_from(section_table);
                    section_table = stm_table;
                },
                Err(e) if e.is_io() => return Err(e),
                Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, e),
            }
        }
        table.merge_from(section_table);

        match trailer.as_mut() {
            Some(newer) => newer.overlay(&section.dict),
            None => trailer = Some(Trailer::new(section.dict.clone())),
        }

        match section.prev() {
            Some(prev) => offset = prev,
            None => break,
        }
    }

    Ok((table, trailer.unwrap_or_default()))
}

/// A loaded document.
///
/// # Example
///
/// ```no_run
/// use pdf_lexis::document::Document;
///
/// let mut doc = Document::open("sample.pdf")?;
/// println!("PDF version: {}.{}", doc.version().0, doc.version().1);
/// let catalog = doc.catalog()?;
/// println!("Catalog kind: {:?}", catalog.kind());
/// # Ok::<(), pdf_lexis::error::Error>(())
/// ```
pub struct Document {
    library: Library,
    trailer: Trailer,
    version: (u8, u8),
    load_issues: Vec<ParseIssue>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Open a file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// Open a file.
    ///
    /// The file handle is shared by every later fetch.
    pub fn open_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let file = SharedFile::open(path)?;
        Self::from_handle(SourceHandle::File(file), options)
    }

    /// Load a document held in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::from_bytes_with_options(data, ParserOptions::default())
    }

    /// Load a document held in memory with custom options.
    pub fn from_bytes_with_options(data: impl Into<Bytes>, options: ParserOptions) -> Result<Self> {
        Self::from_handle(SourceHandle::Memory(data.into()), options)
    }

    /// Load a random-access source.
    ///
    /// If the cross-reference chain cannot be read, or yields no entries,
    /// the table is rebuilt by scanning (unless
    /// [`ParserOptions::reconstruct_on_failure`] is off).
    pub fn from_handle(handle: SourceHandle, options: ParserOptions) -> Result<Self> {
        let head = handle.read_range(0, HEADER_WINDOW)?;
        let version = checked_version(&head, &options)?;

        let (xref, trailer) = match load_xref_chain(&handle, &options) {
            Ok((xref, trailer)) if !xref.is_empty() => (xref, trailer),
            Ok(loaded) if !options.reconstruct_on_failure => loaded,
            Ok(_) => {
                log::warn!("Cross-reference chain is empty, attempting reconstruction");
                reconstruct_xref(&handle, &options)?
            },
            Err(e) if e.is_io() || !options.reconstruct_on_failure => return Err(e),
            Err(e) => {
                log::warn!("Cross-reference chain unreadable: {}, attempting reconstruction", e);
                match reconstruct_xref(&handle, &options) {
                    Ok(rebuilt) => {
                        log::info!("Reconstructed cross-reference table");
                        rebuilt
                    },
                    Err(recon_err) => {
                        log::error!("Reconstruction also failed: {}", recon_err);
                        return Err(e);
                    },
                }
            },
        };

        Ok(Self {
            library: Library::new(handle, xref, options),
            trailer,
            version,
            load_issues: Vec::new(),
        })
    }

    /// Load a non-seekable stream with default options.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, ParserOptions::default())
    }

    /// Load a non-seekable stream by parsing every object once, in order.
    ///
    /// Stream lengths are never trusted and references resolve only to
    /// objects read by the scan. Later trailers override earlier ones, and
    /// object stream members are expanded into the library. When no trailer
    /// is found one is synthesized from the catalog.
    pub fn from_reader_with_options<R: Read>(mut reader: R, options: ParserOptions) -> Result<Self> {
        let mut head = Vec::new();
        reader.by_ref().take(HEADER_WINDOW).read_to_end(&mut head)?;
        let version = checked_version(&head, &options)?;

        let source = ReaderSource::new(std::io::Cursor::new(head).chain(reader));
        let mut parser = Parser::with_options(source, options);
        let mut library = Library::linear(options);
        let mut trailer: Option<Trailer> = None;
        let mut xref = CrossRefTable::new();
        let mut containers = Vec::new();

        loop {
            let found = match parser.next_object(&mut library)? {
                Some(Parsed::Indirect(obj)) => {
                    if obj.object.kind() == Some(ObjectKind::ObjectStream) {
                        containers.push(obj.reference);
                    }
                    match obj.object {
                        Object::Trailer(t) => Some(*t),
                        _ => None,
                    }
                },
                Some(Parsed::Direct(Object::Trailer(t))) => Some(*t),
                Some(Parsed::Direct(Object::CrossReference(table))) => {
                    let mut newer = table;
                    newer.merge_from(xref);
                    xref = newer;
                    None
                },
                Some(Parsed::Direct(_)) => None,
                None if parser.at_end()? => break,
                None => continue,
            };

            if let Some(mut newer) = found {
                if let Some(mut section) = newer.xref.take() {
                    section.merge_from(xref);
                    xref = section;
                }
                if let Some(older) = trailer.take() {
                    newer.overlay(&older.dict);
                }
                trailer = Some(newer);
            }
        }

        let load_issues = parser.take_issues();
        if !load_issues.is_empty() {
            log::debug!("Linear scan recorded {} recoverable issues", load_issues.len());
        }

        for container in containers {
            expand_object_stream(&mut library, container)?;
        }

        let mut trailer = trailer.unwrap_or_default();
        if trailer.root().is_none() {
            let catalog = library
                .cached_objects()
                .find(|(_, obj)| obj.kind() == Some(ObjectKind::Catalog))
                .map(|(r, _)| *r);
            match catalog {
                Some(root) => {
                    log::info!("No trailer names a root; using catalog {}", root);
                    trailer.dict.insert("Root".to_string(), Object::Reference(root));
                },
                None => log::warn!("Linear scan found no catalog"),
            }
        }
        trailer.dict.remove("Prev");

        library.set_xref(xref);
        Ok(Self {
            library,
            trailer,
            version,
            load_issues,
        })
    }

    /// Header version as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The merged trailer.
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// The merged cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        self.library.xref()
    }

    /// Whether the document was read by a linear scan.
    pub fn is_linear(&self) -> bool {
        self.library.is_linear_scan_mode()
    }

    /// Resolve an indirect reference. Unknown objects resolve to `null`.
    pub fn resolve(&mut self, reference: ObjectRef) -> Result<Object> {
        self.library.resolve(reference)
    }

    /// Resolve `obj` if it is a reference.
    pub fn deref(&mut self, obj: &Object) -> Result<Object> {
        self.library.deref(obj)
    }

    /// The document catalog named by `/Root`.
    pub fn catalog(&mut self) -> Result<Object> {
        let root = self
            .trailer
            .root()
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        let catalog = self.library.resolve(root)?;
        if catalog.is_null() {
            return Err(Error::ObjectNotFound(root.id, root.gen));
        }
        Ok(catalog)
    }

    /// Recoverable issues seen so far, while loading and while fetching.
    pub fn issues(&self) -> Vec<ParseIssue> {
        self.load_issues
            .iter()
            .chain(self.library.issues())
            .cloned()
            .collect()
    }

    /// The object library.
    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Mutable access to the object library.
    pub fn library_mut(&mut self) -> &mut Library {
        &mut self.library
    }
}

/// Register the members of a scanned object stream.
fn expand_object_stream(library: &mut Library, container: ObjectRef) -> Result<()> {
    let Some(Object::Stream(stream)) = library.cached(container).cloned() else {
        return Ok(());
    };
    let options = *library.options();
    let factory = library.factory().clone();
    match objstm::parse_object_stream(&stream, &options, &factory) {
        Ok(members) => {
            for (number, value) in members {
                let reference = ObjectRef::new(number, 0);
                if !library.is_cached(reference) {
                    library.register(reference, value);
                }
            }
            Ok(())
        },
        Err(e) if e.is_io() => Err(e),
        Err(e) => {
            log::warn!("Cannot read object stream {}: {}", container, e);
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a file with a classic cross-reference table.
    fn build(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                trailer_extra,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.7\n"), Some((1, 7)));
        assert_eq!(parse_header(b"%PDF-2.0"), Some((2, 0)));
        assert_eq!(parse_header(b"junk\r\n%PDF-1.4\n"), Some((1, 4)));
        assert_eq!(parse_header(b"%PDF-17\n"), None);
        assert_eq!(parse_header(b"NotAPDF\n"), None);
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(checked_version(b"nothing", &ParserOptions::lenient()).unwrap(), DEFAULT_VERSION);
        assert!(matches!(
            checked_version(b"nothing", &ParserOptions::strict()),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_open_classic() {
        let data = build(&["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"], "");
        let mut doc = Document::from_bytes(data).unwrap();
        assert_eq!(doc.version(), (1, 7));
        assert_eq!(doc.xref().len(), 2);
        assert!(!doc.is_linear());
        assert_eq!(doc.catalog().unwrap().kind(), Some(ObjectKind::Catalog));
        let pages = doc.resolve(ObjectRef::new(2, 0)).unwrap();
        assert_eq!(pages.as_typed().and_then(|t| t.as_page_tree()).and_then(|p| p.count()), Some(0));
    }

    #[test]
    fn test_reader_linear_scan() {
        let data = build(&["<< /Type /Catalog >>", "(two)"], "");
        let mut doc = Document::from_reader(std::io::Cursor::new(data)).unwrap();
        assert!(doc.is_linear());
        assert_eq!(doc.trailer().root(), Some(ObjectRef::new(1, 0)));
        assert_eq!(doc.resolve(ObjectRef::new(2, 0)).unwrap().as_string(), Some(&b"two"[..]));
        assert_eq!(doc.xref().len(), 2);
    }

    #[test]
    fn test_bad_startxref_reconstructs() {
        let text = String::from_utf8(build(&["<< /Type /Catalog >>"], "")).unwrap();
        let at = text.rfind("startxref\n").unwrap() + "startxref\n".len();
        let end = at + text[at..].find('\n').unwrap();
        // Point startxref into the header
        let data = format!("{}5{}", &text[..at], &text[end..]);
        let mut doc = Document::from_bytes(data.into_bytes()).unwrap();
        assert_eq!(doc.xref().len(), 1);
        assert_eq!(doc.catalog().unwrap().kind(), Some(ObjectKind::Catalog));
    }

    #[test]
    fn test_missing_root() {
        let data = b"%PDF-1.4\n1 0 obj 5 endobj\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer << /Size 2 >>\nstartxref\n26\n%%EOF";
        let mut doc = Document::from_bytes(&data[..]).unwrap();
        assert!(doc.catalog().is_err());
        assert_eq!(doc.resolve(ObjectRef::new(1, 0)).unwrap(), Object::Integer(5));
    }
}
