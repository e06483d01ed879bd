//! File-backed sources: one shared handle, many cursors.

mod common;

use common::{init_logging, PdfBuilder};
use pdf_lexis::directory::Detached;
use pdf_lexis::object::ObjectRef;
use pdf_lexis::parser::{Parsed, Parser};
use pdf_lexis::source::{FileSource, SharedFile};
use pdf_lexis::typed::ObjectKind;
use pdf_lexis::Document;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

fn write_document(objects: usize) -> (NamedTempFile, Vec<(u32, u64)>) {
    let mut b = PdfBuilder::new("1.7");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    let mut numbers = vec![1, 2];
    for i in 0..objects {
        let n = 3 + i as u32;
        // Payloads larger than the cursor window force refills
        let payload = format!("stream {} ", n).repeat(1200);
        b.stream(n, "", payload.as_bytes());
        numbers.push(n);
    }
    b.classic_xref(&numbers, &format!("/Size {} /Root 1 0 R", 3 + objects));

    let offsets = numbers.iter().map(|&n| (n, b.offset(n) as u64)).collect();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&b.build()).unwrap();
    file.flush().unwrap();
    (file, offsets)
}

#[test]
fn test_open_from_path() {
    init_logging();
    let (file, _) = write_document(2);
    let mut doc = Document::open(file.path()).unwrap();
    assert_eq!(doc.catalog().unwrap().kind(), Some(ObjectKind::Catalog));

    let stream = doc.resolve(ObjectRef::new(4, 0)).unwrap();
    let data = stream.as_stream().unwrap().raw_data().unwrap();
    assert_eq!(data.len(), "stream 4 ".len() * 1200);
    assert!(data.starts_with(b"stream 4 stream 4"));
}

#[test]
fn test_concurrent_parsers_share_one_handle() {
    let (file, offsets) = write_document(8);
    let shared = SharedFile::open(file.path()).unwrap();

    let handles: Vec<_> = offsets
        .into_iter()
        .map(|(number, offset)| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let mut parser = Parser::new(FileSource::at(shared, offset));
                match parser.next_object(&mut Detached).unwrap() {
                    Some(Parsed::Indirect(obj)) => {
                        assert_eq!(obj.reference, ObjectRef::new(number, 0));
                        if let Some(stream) = obj.object.as_stream() {
                            let data = stream.raw_data().unwrap();
                            let expected = format!("stream {} ", number).repeat(1200);
                            assert_eq!(data.as_ref(), expected.as_bytes());
                        }
                        number
                    },
                    other => panic!("object {} parsed as {:?}", number, other),
                }
            })
        })
        .collect();

    let mut seen: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (1..=10).collect::<Vec<u32>>());
}

#[test]
fn test_independent_documents_on_threads() {
    let (file, _) = write_document(3);
    let path = file.path().to_path_buf();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let mut doc = Document::open(&path).unwrap();
                doc.resolve(ObjectRef::new(5, 0)).unwrap().as_stream().map(|s| s.data.len())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(("stream 5 ".len() * 1200) as u64));
    }
}
