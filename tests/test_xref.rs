//! Cross-reference sections and trailers as seen by callers.

use pdf_lexis::directory::Detached;
use pdf_lexis::lexer::Lexer;
use pdf_lexis::object::ObjectRef;
use pdf_lexis::parser::Parser;
use pdf_lexis::source::SliceSource;
use pdf_lexis::xref::{find_startxref, parse_section, XRefEntry};

fn section(input: &[u8]) -> pdf_lexis::xref::CrossRefTable {
    let mut lexer = Lexer::new(SliceSource::new(input.to_vec()));
    // `parse_section` starts after the `xref` keyword
    lexer.next_token().unwrap();
    parse_section(&mut lexer).unwrap().0
}

#[test]
fn test_free_entry_produces_empty_table() {
    assert!(section(b"xref\n0 1\n0000000000 65535 f \n").is_empty());
}

#[test]
fn test_in_use_entry_maps_to_offset() {
    let table = section(b"xref\n1 1\n0000000017 00000 n \n");
    assert_eq!(table.len(), 1);
    assert_eq!(table.offset_of(ObjectRef::new(1, 0)), Some(17));
    assert_eq!(table.offset_of(ObjectRef::new(1, 1)), None);
}

#[test]
fn test_multiple_subsections_and_crlf_entries() {
    let table = section(b"xref\r\n0 2\r\n0000000000 65535 f\r\n0000000100 00000 n\r\n5 2\r\n0000000200 00001 n\r\n0000000300 00000 n\r\n");
    assert_eq!(table.len(), 3);
    assert_eq!(
        table.get(5),
        Some(&XRefEntry::InUse {
            offset: 200,
            generation: 1
        })
    );
    assert_eq!(table.offset_of(ObjectRef::new(6, 0)), Some(300));
}

#[test]
fn test_trailer_after_section() {
    let input = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Root 3 0 R /Prev 120 >>\nstartxref\n0\n%%EOF";
    let mut parser = Parser::new(SliceSource::new(&input[..]));
    let parsed = parser.next_object(&mut Detached).unwrap().unwrap().into_object();
    let trailer = parsed.as_trailer().unwrap();
    assert_eq!(trailer.root(), Some(ObjectRef::new(3, 0)));
    assert_eq!(trailer.prev(), Some(120));
    assert!(trailer.xref.as_ref().unwrap().is_empty());
}

#[test]
fn test_startxref_uses_last_occurrence() {
    let tail = b"startxref\n100\n%%EOF\n% update\nstartxref\r\n2345\r\n%%EOF";
    assert_eq!(find_startxref(tail), Some(2345));
    assert_eq!(find_startxref(b"no marker"), None);
}
