//! Cross-reference table reconstruction for damaged files.
//!
//! When the cross-reference chain is corrupted, missing, or empty, the table
//! can be rebuilt by scanning the whole input for `N G obj` headers. This is
//! a fallback used only when regular loading fails.

use crate::directory::{Detached, Library, ObjectDirectory};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm;
use crate::parser::{Parsed, Parser};
use crate::parser_config::ParserOptions;
use crate::source::SourceHandle;
use crate::typed::ObjectKind;
use crate::xref::{CrossRefTable, Trailer, XRefEntry};
use lazy_static::lazy_static;

lazy_static! {
    /// Regex for finding "N G obj" headers
    static ref RE_OBJ_PATTERN: regex::bytes::Regex = regex::bytes::Regex::new(r"(\d+)[ \t\r\n\f\x00]+(\d+)[ \t\r\n\f\x00]+obj(?-u:\b)").unwrap();

    /// Regex for finding "trailer <<" dictionaries
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer[ \t\r\n\f\x00]*<<").unwrap();
}

fn ascii_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Find every `N G obj` header. Later definitions of a number win.
fn scan_object_headers(contents: &[u8]) -> CrossRefTable {
    let mut xref = CrossRefTable::new();

    for capture in RE_OBJ_PATTERN.captures_iter(contents) {
        let (Some(full), Some(num), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2)) else {
            continue;
        };
        // "112 0 obj" must not also register as "12 0 obj"
        if full.start() > 0 && contents[full.start() - 1].is_ascii_digit() {
            continue;
        }
        let (Some(number), Some(generation)) = (ascii_number::<u32>(num.as_bytes()), ascii_number::<u16>(gen.as_bytes()))
        else {
            log::debug!("Skipping out-of-range object header at byte {}", full.start());
            continue;
        };
        xref.insert(
            number,
            XRefEntry::InUse {
                offset: full.start() as u64,
                generation,
            },
        );
    }

    xref
}

/// Parse the last classic `trailer << >>` dictionary, if any.
fn find_classic_trailer(handle: &SourceHandle, contents: &[u8], options: &ParserOptions) -> Result<Option<(u64, Dictionary)>> {
    let Some(last) = RE_TRAILER.find_iter(contents).last() else {
        return Ok(None);
    };

    let offset = last.start() as u64;
    let mut parser = Parser::with_options(handle.cursor_at(offset), *options);
    match parser.next_object(&mut Detached)? {
        Some(Parsed::Direct(Object::Trailer(trailer))) => Ok(Some((offset, trailer.dict))),
        _ => {
            log::warn!("Unreadable trailer dictionary at byte {}", offset);
            Ok(None)
        },
    }
}

/// Reconstruct the cross-reference table by scanning the entire input.
///
/// Besides the object headers this also:
/// - picks the newest trailer, either a classic `trailer` dictionary or the
///   dictionary of a cross-reference stream
/// - registers the members of object streams as compressed entries
/// - synthesizes `/Root` from a `/Type /Catalog` object when no trailer
///   names a usable one
///
/// # Errors
///
/// Returns an error if the input cannot be read or holds no objects.
pub fn reconstruct_xref(handle: &SourceHandle, options: &ParserOptions) -> Result<(CrossRefTable, Trailer)> {
    log::info!("Reconstructing cross-reference table by scanning {} bytes", handle.len());

    let contents = handle.read_range(0, handle.len())?;
    let mut xref = scan_object_headers(&contents);
    if xref.is_empty() {
        return Err(Error::InvalidPdf("no objects found while reconstructing".to_string()));
    }
    log::info!("Found {} object headers", xref.len());

    let mut newest_trailer = find_classic_trailer(handle, &contents, options)?;
    let mut catalog: Option<ObjectRef> = None;
    let mut library = Library::new(handle.clone(), xref.clone(), *options);

    let mut direct: Vec<(u32, XRefEntry)> = xref.iter().map(|(n, e)| (n, *e)).collect();
    direct.sort_by_key(|(n, _)| *n);

    for (number, entry) in direct {
        let XRefEntry::InUse { offset, generation } = entry else {
            continue;
        };
        let reference = ObjectRef::new(number, generation);
        let obj = match library.resolve(reference) {
            Ok(obj) => obj,
            Err(e) if e.is_io() => return Err(e),
            Err(e) => {
                log::debug!("Skipping object {} during reconstruction: {}", reference, e);
                continue;
            },
        };

        match &obj {
            Object::Trailer(trailer) => {
                if newest_trailer.as_ref().map_or(true, |(at, _)| offset > *at) {
                    newest_trailer = Some((offset, trailer.dict.clone()));
                }
            },
            Object::Stream(stream) if stream.kind == Some(ObjectKind::ObjectStream) => {
                match objstm::parse_object_stream(stream, options, library.factory()) {
                    Ok(members) => {
                        for (index, (member, value)) in members.into_iter().enumerate() {
                            if xref.contains(member) {
                                continue;
                            }
                            xref.insert(
                                member,
                                XRefEntry::Compressed {
                                    container: number,
                                    index: index as u32,
                                },
                            );
                            if value.kind() == Some(ObjectKind::Catalog) {
                                catalog = Some(ObjectRef::new(member, 0));
                            }
                        }
                    },
                    Err(e) if e.is_io() => return Err(e),
                    Err(e) => log::warn!("Cannot read object stream {}: {}", reference, e),
                }
            },
            other if other.kind() == Some(ObjectKind::Catalog) => catalog = Some(reference),
            _ => {},
        }
    }

    let mut dict = newest_trailer.map(|(_, dict)| dict).unwrap_or_default();
    dict.remove("Prev");
    dict.remove("XRefStm");

    let root_usable = match dict.get("Root").and_then(Object::as_reference) {
        Some(root) => xref.lookup(root).is_some_and(XRefEntry::is_in_use),
        None => false,
    };
    if !root_usable {
        match catalog {
            Some(root) => {
                log::info!("Using catalog {} as document root", root);
                dict.insert("Root".to_string(), Object::Reference(root));
            },
            None => log::warn!("No catalog found while reconstructing"),
        }
    }

    let size = xref.iter().map(|(n, _)| n).max().map_or(0, |n| n as i64 + 1);
    dict.insert("Size".to_string(), Object::Integer(size));

    log::info!("Reconstructed {} entries", xref.len());
    Ok((xref, Trailer::new(dict)))
}
