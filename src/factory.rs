//! Registry of constructors for dictionaries and streams with a known type.
//!
//! The assembler consults the factory once each time a `>>` closes a
//! dictionary and once per `stream` keyword. Unrecognized types pass through
//! unchanged as plain [`Object::Dictionary`] / [`Object::Stream`] values.

use crate::object::{dict_integer, dict_name, Dictionary, Object, Stream};
use crate::typed::{ObjectKind, TypedDictionary};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a value from a dictionary with a recognized `/Type`.
pub type DictionaryConstructor = fn(Dictionary) -> Object;

/// Builds a value from a stream with a recognized `/Type` or `/Subtype`.
pub type StreamConstructor = fn(Stream) -> Object;

lazy_static! {
    static ref SHARED: Arc<ObjectFactory> = Arc::new(ObjectFactory::new());
}

/// Type-name to constructor registry.
#[derive(Debug, Clone)]
pub struct ObjectFactory {
    dictionaries: HashMap<String, DictionaryConstructor>,
    streams: HashMap<String, StreamConstructor>,
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectFactory {
    /// Factory with the built-in document types registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register_dictionary("Catalog", catalog);
        factory.register_dictionary("Pages", page_tree);
        factory.register_dictionary("Page", page);
        factory.register_dictionary("Font", font);
        factory.register_dictionary("FontDescriptor", font_descriptor);
        factory.register_dictionary("Annot", annotation);
        factory.register_dictionary("CMap", cmap);
        factory.register_stream("CMap", cmap_stream);
        factory.register_stream("ObjStm", object_stream);
        factory.register_stream("Pattern", pattern_stream);
        factory.register_stream("Form", form_stream);
        factory
    }

    /// Factory that recognizes nothing.
    pub fn empty() -> Self {
        Self {
            dictionaries: HashMap::new(),
            streams: HashMap::new(),
        }
    }

    /// The process-wide default factory.
    pub fn shared() -> Arc<ObjectFactory> {
        SHARED.clone()
    }

    /// Register (or replace) a dictionary constructor for `type_name`.
    pub fn register_dictionary(&mut self, type_name: &str, ctor: DictionaryConstructor) {
        self.dictionaries.insert(type_name.to_string(), ctor);
    }

    /// Register (or replace) a stream constructor for `type_name`.
    pub fn register_stream(&mut self, type_name: &str, ctor: StreamConstructor) {
        self.streams.insert(type_name.to_string(), ctor);
    }

    /// Wrap `dict` as `type_name`, or return it as a plain dictionary when
    /// the name is not registered.
    pub fn construct(&self, type_name: &str, dict: Dictionary) -> Object {
        match self.dictionaries.get(type_name) {
            Some(ctor) => ctor(dict),
            None => Object::Dictionary(dict),
        }
    }

    /// Dispatch a freshly closed dictionary on its `/Type`.
    pub fn construct_dictionary(&self, dict: Dictionary) -> Object {
        let type_name = dict_name(&dict, "Type").map(str::to_string);
        match type_name {
            Some(name) => self.construct(&name, dict),
            None => Object::Dictionary(dict),
        }
    }

    /// Dispatch a stream on its `/Type`, then its `/Subtype`.
    pub fn construct_stream(&self, stream: Stream) -> Object {
        let ctor = ["Type", "Subtype"]
            .iter()
            .filter_map(|key| dict_name(&stream.dict, key))
            .find_map(|name| self.streams.get(name))
            .copied();
        match ctor {
            Some(ctor) => {
                log::debug!("Constructing specialized stream for {:?}", stream.owner);
                ctor(stream)
            },
            None => Object::Stream(Box::new(stream)),
        }
    }
}

fn typed(kind: ObjectKind, dict: Dictionary) -> Object {
    Object::Typed(TypedDictionary::new(kind, dict))
}

fn catalog(dict: Dictionary) -> Object {
    typed(ObjectKind::Catalog, dict)
}

fn page_tree(dict: Dictionary) -> Object {
    typed(ObjectKind::PageTree, dict)
}

fn page(dict: Dictionary) -> Object {
    typed(ObjectKind::Page, dict)
}

fn font(dict: Dictionary) -> Object {
    typed(ObjectKind::Font, dict)
}

fn font_descriptor(dict: Dictionary) -> Object {
    typed(ObjectKind::FontDescriptor, dict)
}

fn annotation(dict: Dictionary) -> Object {
    typed(ObjectKind::Annotation, dict)
}

fn cmap(dict: Dictionary) -> Object {
    typed(ObjectKind::CMap, dict)
}

fn tagged(kind: ObjectKind, mut stream: Stream) -> Object {
    stream.kind = Some(kind);
    Object::Stream(Box::new(stream))
}

fn cmap_stream(stream: Stream) -> Object {
    tagged(ObjectKind::CMap, stream)
}

fn object_stream(stream: Stream) -> Object {
    tagged(ObjectKind::ObjectStream, stream)
}

fn form_stream(stream: Stream) -> Object {
    tagged(ObjectKind::Form, stream)
}

// Shading patterns (PatternType 2) stay plain streams.
fn pattern_stream(stream: Stream) -> Object {
    if dict_integer(&stream.dict, "PatternType") == Some(1) {
        tagged(ObjectKind::TilingPattern, stream)
    } else {
        Object::Stream(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamByteRange;
    use bytes::Bytes;

    fn dict_with(entries: &[(&str, &str)]) -> Dictionary {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Object::Name(v.to_string())))
            .collect()
    }

    fn stream_with(dict: Dictionary) -> Stream {
        Stream::new(dict, StreamByteRange::owned(Bytes::new()))
    }

    #[test]
    fn test_known_dictionary_types() {
        let factory = ObjectFactory::new();
        for (name, kind) in [
            ("Catalog", ObjectKind::Catalog),
            ("Pages", ObjectKind::PageTree),
            ("Page", ObjectKind::Page),
            ("Font", ObjectKind::Font),
            ("FontDescriptor", ObjectKind::FontDescriptor),
            ("Annot", ObjectKind::Annotation),
            ("CMap", ObjectKind::CMap),
        ] {
            let obj = factory.construct_dictionary(dict_with(&[("Type", name)]));
            assert_eq!(obj.kind(), Some(kind), "type {}", name);
        }
    }

    #[test]
    fn test_unknown_type_stays_plain() {
        let factory = ObjectFactory::new();
        let obj = factory.construct("Bogus", dict_with(&[("Type", "Bogus")]));
        assert!(matches!(obj, Object::Dictionary(_)));
        let obj = factory.construct_dictionary(Dictionary::new());
        assert!(matches!(obj, Object::Dictionary(_)));
    }

    #[test]
    fn test_stream_subtype_dispatch() {
        let factory = ObjectFactory::new();
        let form = factory.construct_stream(stream_with(dict_with(&[
            ("Type", "XObject"),
            ("Subtype", "Form"),
        ])));
        assert_eq!(form.kind(), Some(ObjectKind::Form));

        let image = factory.construct_stream(stream_with(dict_with(&[
            ("Type", "XObject"),
            ("Subtype", "Image"),
        ])));
        assert_eq!(image.kind(), None);
    }

    #[test]
    fn test_cmap_dictionary_and_stream() {
        let factory = ObjectFactory::new();
        let mut dict = dict_with(&[("Type", "CMap"), ("CMapName", "Custom-H")]);
        let obj = factory.construct_dictionary(dict.clone());
        let typed = obj.as_typed().unwrap();
        assert_eq!(typed.as_cmap().unwrap().cmap_name(), Some("Custom-H"));

        dict.insert("Length".to_string(), Object::Integer(0));
        let obj = factory.construct_stream(stream_with(dict));
        assert_eq!(obj.as_stream().unwrap().as_cmap().unwrap().cmap_name(), Some("Custom-H"));
    }

    #[test]
    fn test_pattern_type_selects_tiling() {
        let factory = ObjectFactory::new();
        let mut tiling = dict_with(&[("Type", "Pattern")]);
        tiling.insert("PatternType".to_string(), Object::Integer(1));
        let mut shading = dict_with(&[("Type", "Pattern")]);
        shading.insert("PatternType".to_string(), Object::Integer(2));

        let obj = factory.construct_stream(stream_with(tiling));
        assert_eq!(obj.kind(), Some(ObjectKind::TilingPattern));
        let obj = factory.construct_stream(stream_with(shading));
        assert_eq!(obj.kind(), None);
    }

    #[test]
    fn test_custom_registration() {
        fn as_page(dict: Dictionary) -> Object {
            Object::Typed(TypedDictionary::new(ObjectKind::Page, dict))
        }
        let mut factory = ObjectFactory::empty();
        assert!(factory.construct_dictionary(dict_with(&[("Type", "Page")])).kind().is_none());
        factory.register_dictionary("Sheet", as_page);
        let obj = factory.construct_dictionary(dict_with(&[("Type", "Sheet")]));
        assert_eq!(obj.kind(), Some(ObjectKind::Page));
    }
}
