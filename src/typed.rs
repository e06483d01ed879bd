//! Typed wrappers for dictionaries and streams with a recognized `/Type`.
//!
//! The wrappers never copy or validate anything: they keep the generic
//! dictionary and add accessors for the keys each type is known to carry.
//! A missing or mistyped key simply yields `None`.

use crate::object::{Dictionary, Object, ObjectRef, Stream};

/// Specialized object kinds the factory knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Document catalog (`/Type /Catalog`)
    Catalog,
    /// Page tree node (`/Type /Pages`)
    PageTree,
    /// Page leaf (`/Type /Page`)
    Page,
    /// Font (`/Type /Font`)
    Font,
    /// Font descriptor (`/Type /FontDescriptor`)
    FontDescriptor,
    /// Annotation (`/Type /Annot`)
    Annotation,
    /// Character map (`/Type /CMap`), as a stream or a bare dictionary
    CMap,
    /// Form XObject stream (`/Subtype /Form`)
    Form,
    /// Tiling pattern stream (`/Type /Pattern /PatternType 1`)
    TilingPattern,
    /// Object stream (`/Type /ObjStm`)
    ObjectStream,
}

/// A dictionary tagged with its specialized kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDictionary {
    kind: ObjectKind,
    dict: Dictionary,
}

impl TypedDictionary {
    /// Tag a dictionary.
    pub fn new(kind: ObjectKind, dict: Dictionary) -> Self {
        Self { kind, dict }
    }

    /// The specialized kind.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// The underlying dictionary.
    pub fn dict(&self) -> &Dictionary {
        &self.dict
    }

    /// Give back the underlying dictionary.
    pub fn into_dict(self) -> Dictionary {
        self.dict
    }

    /// Look up a key in the underlying dictionary.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.dict.get(key)
    }

    /// Catalog view, if this is a catalog.
    pub fn as_catalog(&self) -> Option<Catalog<'_>> {
        (self.kind == ObjectKind::Catalog).then_some(Catalog(&self.dict))
    }

    /// Page tree view, if this is a page tree node.
    pub fn as_page_tree(&self) -> Option<PageTree<'_>> {
        (self.kind == ObjectKind::PageTree).then_some(PageTree(&self.dict))
    }

    /// Page view, if this is a page.
    pub fn as_page(&self) -> Option<Page<'_>> {
        (self.kind == ObjectKind::Page).then_some(Page(&self.dict))
    }

    /// Font view, if this is a font.
    pub fn as_font(&self) -> Option<Font<'_>> {
        (self.kind == ObjectKind::Font).then_some(Font(&self.dict))
    }

    /// Font descriptor view, if this is a font descriptor.
    pub fn as_font_descriptor(&self) -> Option<FontDescriptor<'_>> {
        (self.kind == ObjectKind::FontDescriptor).then_some(FontDescriptor(&self.dict))
    }

    /// Annotation view, if this is an annotation.
    pub fn as_annotation(&self) -> Option<Annotation<'_>> {
        (self.kind == ObjectKind::Annotation).then_some(Annotation(&self.dict))
    }

    /// CMap view, for a character map dictionary seen without its stream.
    pub fn as_cmap(&self) -> Option<CMap<'_>> {
        (self.kind == ObjectKind::CMap).then_some(CMap(&self.dict))
    }
}

impl Stream {
    /// Form XObject view, if this stream is a form.
    pub fn as_form(&self) -> Option<Form<'_>> {
        (self.kind == Some(ObjectKind::Form)).then_some(Form(&self.dict))
    }

    /// Tiling pattern view, if this stream is a tiling pattern.
    pub fn as_tiling_pattern(&self) -> Option<TilingPattern<'_>> {
        (self.kind == Some(ObjectKind::TilingPattern)).then_some(TilingPattern(&self.dict))
    }

    /// Object stream view, if this stream is an object stream.
    pub fn as_object_stream(&self) -> Option<ObjectStream<'_>> {
        (self.kind == Some(ObjectKind::ObjectStream)).then_some(ObjectStream(&self.dict))
    }

    /// CMap view, if this stream is a character map.
    pub fn as_cmap(&self) -> Option<CMap<'_>> {
        (self.kind == Some(ObjectKind::CMap)).then_some(CMap(&self.dict))
    }
}

fn reference(dict: &Dictionary, key: &str) -> Option<ObjectRef> {
    dict.get(key).and_then(Object::as_reference)
}

fn name<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a str> {
    dict.get(key).and_then(Object::as_name)
}

fn numbers<const N: usize>(dict: &Dictionary, key: &str) -> Option<[f64; N]> {
    let array = dict.get(key)?.as_array()?;
    if array.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(array) {
        *slot = obj.as_number()?;
    }
    Some(out)
}

/// Document catalog.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a>(&'a Dictionary);

impl<'a> Catalog<'a> {
    /// Root of the page tree.
    pub fn pages(&self) -> Option<ObjectRef> {
        reference(self.0, "Pages")
    }

    /// Document outline root.
    pub fn outlines(&self) -> Option<ObjectRef> {
        reference(self.0, "Outlines")
    }

    /// Name dictionary, direct or by reference.
    pub fn names(&self) -> Option<&'a Object> {
        self.0.get("Names")
    }

    /// Version override, e.g. `1.7`.
    pub fn version(&self) -> Option<&'a str> {
        name(self.0, "Version")
    }
}

/// Intermediate page tree node.
#[derive(Debug, Clone, Copy)]
pub struct PageTree<'a>(&'a Dictionary);

impl<'a> PageTree<'a> {
    /// Child nodes, skipping anything that is not a reference.
    pub fn kids(&self) -> Vec<ObjectRef> {
        self.0
            .get("Kids")
            .and_then(Object::as_array)
            .map(|kids| kids.iter().filter_map(Object::as_reference).collect())
            .unwrap_or_default()
    }

    /// Number of leaf pages below this node.
    pub fn count(&self) -> Option<i64> {
        self.0.get("Count").and_then(Object::as_integer)
    }

    /// Parent node.
    pub fn parent(&self) -> Option<ObjectRef> {
        reference(self.0, "Parent")
    }
}

/// Page leaf.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a>(&'a Dictionary);

impl<'a> Page<'a> {
    /// Parent page tree node.
    pub fn parent(&self) -> Option<ObjectRef> {
        reference(self.0, "Parent")
    }

    /// Content stream reference or array.
    pub fn contents(&self) -> Option<&'a Object> {
        self.0.get("Contents")
    }

    /// Resource dictionary, direct or by reference.
    pub fn resources(&self) -> Option<&'a Object> {
        self.0.get("Resources")
    }

    /// `[llx lly urx ury]`
    pub fn media_box(&self) -> Option<[f64; 4]> {
        numbers(self.0, "MediaBox")
    }
}

/// Font dictionary.
#[derive(Debug, Clone, Copy)]
pub struct Font<'a>(&'a Dictionary);

impl<'a> Font<'a> {
    /// `Type1`, `TrueType`, `Type0`, ...
    pub fn subtype(&self) -> Option<&'a str> {
        name(self.0, "Subtype")
    }

    /// PostScript name of the font.
    pub fn base_font(&self) -> Option<&'a str> {
        name(self.0, "BaseFont")
    }

    /// Encoding name or dictionary.
    pub fn encoding(&self) -> Option<&'a Object> {
        self.0.get("Encoding")
    }

    /// Font descriptor reference.
    pub fn font_descriptor(&self) -> Option<ObjectRef> {
        reference(self.0, "FontDescriptor")
    }

    /// ToUnicode CMap stream reference.
    pub fn to_unicode(&self) -> Option<ObjectRef> {
        reference(self.0, "ToUnicode")
    }
}

/// Font descriptor.
#[derive(Debug, Clone, Copy)]
pub struct FontDescriptor<'a>(&'a Dictionary);

impl<'a> FontDescriptor<'a> {
    /// PostScript name of the font.
    pub fn font_name(&self) -> Option<&'a str> {
        name(self.0, "FontName")
    }

    /// Font flags bit field.
    pub fn flags(&self) -> Option<i64> {
        self.0.get("Flags").and_then(Object::as_integer)
    }

    /// Embedded font program, whichever of `FontFile`, `FontFile2` or
    /// `FontFile3` is present.
    pub fn font_file(&self) -> Option<ObjectRef> {
        ["FontFile", "FontFile2", "FontFile3"]
            .iter()
            .find_map(|key| reference(self.0, key))
    }
}

/// Annotation dictionary.
#[derive(Debug, Clone, Copy)]
pub struct Annotation<'a>(&'a Dictionary);

impl<'a> Annotation<'a> {
    /// `Link`, `Text`, `Widget`, ...
    pub fn subtype(&self) -> Option<&'a str> {
        name(self.0, "Subtype")
    }

    /// Annotation rectangle.
    pub fn rect(&self) -> Option<[f64; 4]> {
        numbers(self.0, "Rect")
    }

    /// Text contents, still in document encoding.
    pub fn contents(&self) -> Option<&'a [u8]> {
        self.0.get("Contents").and_then(Object::as_string)
    }
}

/// Form XObject.
#[derive(Debug, Clone, Copy)]
pub struct Form<'a>(&'a Dictionary);

impl<'a> Form<'a> {
    /// Form bounding box.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        numbers(self.0, "BBox")
    }

    /// Form matrix, identity when absent.
    pub fn matrix(&self) -> [f64; 6] {
        numbers(self.0, "Matrix").unwrap_or([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    /// Resource dictionary, direct or by reference.
    pub fn resources(&self) -> Option<&'a Object> {
        self.0.get("Resources")
    }
}

/// Tiling pattern.
#[derive(Debug, Clone, Copy)]
pub struct TilingPattern<'a>(&'a Dictionary);

impl<'a> TilingPattern<'a> {
    /// 1 = colored, 2 = uncolored.
    pub fn paint_type(&self) -> Option<i64> {
        self.0.get("PaintType").and_then(Object::as_integer)
    }

    /// Spacing adjustment mode.
    pub fn tiling_type(&self) -> Option<i64> {
        self.0.get("TilingType").and_then(Object::as_integer)
    }

    /// Pattern cell bounding box.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        numbers(self.0, "BBox")
    }

    /// Horizontal cell spacing.
    pub fn x_step(&self) -> Option<f64> {
        self.0.get("XStep").and_then(Object::as_number)
    }

    /// Vertical cell spacing.
    pub fn y_step(&self) -> Option<f64> {
        self.0.get("YStep").and_then(Object::as_number)
    }
}

/// Object stream header.
#[derive(Debug, Clone, Copy)]
pub struct ObjectStream<'a>(&'a Dictionary);

impl<'a> ObjectStream<'a> {
    /// Number of objects stored (`/N`).
    pub fn count(&self) -> Option<i64> {
        self.0.get("N").and_then(Object::as_integer)
    }

    /// Offset of the first object in the decoded data (`/First`).
    pub fn first(&self) -> Option<i64> {
        self.0.get("First").and_then(Object::as_integer)
    }

    /// Object stream this one extends.
    pub fn extends(&self) -> Option<ObjectRef> {
        reference(self.0, "Extends")
    }
}

/// Character map stream.
#[derive(Debug, Clone, Copy)]
pub struct CMap<'a>(&'a Dictionary);

impl<'a> CMap<'a> {
    /// `/CMapName`
    pub fn cmap_name(&self) -> Option<&'a str> {
        name(self.0, "CMapName")
    }

    /// Base CMap this one extends, by name or stream reference.
    pub fn use_cmap(&self) -> Option<&'a Object> {
        self.0.get("UseCMap")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: Vec<(&str, Object)>) -> Dictionary {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_catalog_accessors() {
        let typed = TypedDictionary::new(
            ObjectKind::Catalog,
            dict(vec![
                ("Type", Object::Name("Catalog".into())),
                ("Pages", Object::Reference(ObjectRef::new(2, 0))),
                ("Version", Object::Name("1.7".into())),
            ]),
        );
        let catalog = typed.as_catalog().unwrap();
        assert_eq!(catalog.pages(), Some(ObjectRef::new(2, 0)));
        assert_eq!(catalog.version(), Some("1.7"));
        assert!(catalog.outlines().is_none());
        assert!(typed.as_page().is_none());
    }

    #[test]
    fn test_page_tree_kids_skip_non_references() {
        let typed = TypedDictionary::new(
            ObjectKind::PageTree,
            dict(vec![
                (
                    "Kids",
                    Object::Array(vec![
                        Object::Reference(ObjectRef::new(3, 0)),
                        Object::Integer(9),
                        Object::Reference(ObjectRef::new(4, 0)),
                    ]),
                ),
                ("Count", Object::Integer(2)),
            ]),
        );
        let tree = typed.as_page_tree().unwrap();
        assert_eq!(tree.kids(), vec![ObjectRef::new(3, 0), ObjectRef::new(4, 0)]);
        assert_eq!(tree.count(), Some(2));
    }

    #[test]
    fn test_page_media_box_mixed_numbers() {
        let typed = TypedDictionary::new(
            ObjectKind::Page,
            dict(vec![(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(612.5),
                    Object::Integer(792),
                ]),
            )]),
        );
        assert_eq!(typed.as_page().unwrap().media_box(), Some([0.0, 0.0, 612.5, 792.0]));
    }

    #[test]
    fn test_font_descriptor_font_file_variants() {
        let typed = TypedDictionary::new(
            ObjectKind::FontDescriptor,
            dict(vec![
                ("FontName", Object::Name("Helvetica".into())),
                ("FontFile2", Object::Reference(ObjectRef::new(12, 0))),
            ]),
        );
        let fd = typed.as_font_descriptor().unwrap();
        assert_eq!(fd.font_name(), Some("Helvetica"));
        assert_eq!(fd.font_file(), Some(ObjectRef::new(12, 0)));
    }
}
