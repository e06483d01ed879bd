//! Fixture builder shared by the integration tests.
//!
//! Produces small but structurally exact files: every offset in the
//! cross-reference sections points at the object it names.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::Write;

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Incrementally written document.
pub struct PdfBuilder {
    out: Vec<u8>,
    offsets: BTreeMap<u32, usize>,
    last_xref: Option<usize>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut out = format!("%PDF-{}\n", version).into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            offsets: BTreeMap::new(),
            last_xref: None,
        }
    }

    /// Append `N 0 obj <body> endobj`.
    pub fn object(&mut self, number: u32, body: &str) -> &mut Self {
        self.object_bytes(number, body.as_bytes())
    }

    /// Append an object whose body holds raw bytes.
    pub fn object_bytes(&mut self, number: u32, body: &[u8]) -> &mut Self {
        self.offsets.insert(number, self.out.len());
        self.out.extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
        self
    }

    /// Append a stream object with a correct `/Length`.
    pub fn stream(&mut self, number: u32, dict_entries: &str, payload: &[u8]) -> &mut Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict_entries, payload.len()).into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(number, &body)
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Offset of the most recent definition of `number`.
    pub fn offset(&self, number: u32) -> usize {
        self.offsets[&number]
    }

    /// Current length of the output.
    pub fn position(&self) -> usize {
        self.out.len()
    }

    /// Write a classic section listing `numbers`, a trailer with `entries`
    /// (plus `/Prev` when an earlier section exists) and `startxref`.
    pub fn classic_xref(&mut self, numbers: &[u32], entries: &str) -> usize {
        let at = self.out.len();
        let mut section = String::from("xref\n");
        if self.last_xref.is_none() {
            section.push_str("0 1\n0000000000 65535 f \n");
        }
        for &n in numbers {
            section.push_str(&format!("{} 1\n{:010} 00000 n \n", n, self.offset(n)));
        }
        let prev = self.last_xref.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
        section.push_str(&format!(
            "trailer\n<< {}{} >>\nstartxref\n{}\n%%EOF\n",
            entries, prev, at
        ));
        self.out.extend_from_slice(section.as_bytes());
        self.last_xref = Some(at);
        at
    }

    /// Write a cross-reference stream as object `number`.
    ///
    /// `rows` are `(object, type, field2, field3)`. The stream uses
    /// `/W [1 4 2]`, FlateDecode and the PNG Up predictor.
    pub fn xref_stream(&mut self, number: u32, rows: &[(u32, u8, u64, u16)], entries: &str) -> usize {
        let at = self.out.len();
        let mut rows: Vec<(u32, u8, u64, u16)> = rows.to_vec();
        rows.push((number, 1, at as u64, 0));
        rows.sort_by_key(|r| r.0);

        let mut index = String::new();
        let mut raw_rows = Vec::new();
        for (n, kind, f2, f3) in &rows {
            index.push_str(&format!("{} 1 ", n));
            let mut row = vec![*kind];
            row.extend_from_slice(&(*f2 as u32).to_be_bytes());
            row.extend_from_slice(&f3.to_be_bytes());
            raw_rows.push(row);
        }

        let mut predicted = Vec::new();
        let mut prev = vec![0u8; 7];
        for row in &raw_rows {
            predicted.push(2);
            for i in 0..7 {
                predicted.push(row[i].wrapping_sub(prev[i]));
            }
            prev = row.clone();
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&predicted).unwrap();
        let payload = encoder.finish().unwrap();

        let prev_entry = self.last_xref.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
        let dict = format!(
            "/Type /XRef /W [1 4 2] /Index [{}] /Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns 7 >> {}{}",
            index.trim_end(),
            entries,
            prev_entry
        );
        self.stream(number, &dict, &payload);
        self.out
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", at).as_bytes());
        self.last_xref = Some(at);
        at
    }

    /// Start the next section without a `/Prev` link.
    pub fn forget_xref(&mut self) -> &mut Self {
        self.last_xref = None;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.out.clone()
    }
}

/// An object stream body for `members`, returned as (dictionary entries, payload).
pub fn object_stream(members: &[(u32, &str)]) -> (String, Vec<u8>) {
    let mut header = String::new();
    let mut objects = String::new();
    for (n, body) in members {
        header.push_str(&format!("{} {} ", n, objects.len()));
        objects.push_str(body);
        objects.push(' ');
    }
    let first = header.len();
    let data = format!("{}{}", header, objects);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    let payload = encoder.finish().unwrap();
    (
        format!("/Type /ObjStm /N {} /First {} /Filter /FlateDecode", members.len(), first),
        payload,
    )
}

/// A two-object document with a classic table.
pub fn minimal_document() -> Vec<u8> {
    let mut b = PdfBuilder::new("1.7");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>")
        .stream(4, "", b"BT /F1 12 Tf (Hi) Tj ET");
    b.classic_xref(&[1, 2, 3, 4], "/Size 5 /Root 1 0 R");
    b.build()
}
