//! Object directories.
//!
//! The assembler needs a collaborator to resolve indirect `/Length` values
//! and to hand completed indirect objects to. [`ObjectDirectory`] is that
//! seam. [`Library`] is the real implementation backed by a cross-reference
//! table and a cache; [`Detached`] is for parsing fragments that have no
//! surrounding file.

use crate::error::{Error, ParseIssue, Result};
use crate::factory::ObjectFactory;
use crate::object::{Object, ObjectRef};
use crate::objstm;
use crate::parser::{Parsed, Parser};
use crate::parser_config::ParserOptions;
use crate::source::SourceHandle;
use crate::xref::{CrossRefTable, XRefEntry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Resolves references and receives completed indirect objects.
pub trait ObjectDirectory {
    /// Resolve a reference. Unknown objects resolve to [`Object::Null`].
    fn resolve(&mut self, reference: ObjectRef) -> Result<Object>;

    /// Record a completed indirect object.
    fn register(&mut self, reference: ObjectRef, value: Object);

    /// Whether the input is being read front to back without random access.
    ///
    /// In this mode declared stream lengths are never trusted and
    /// references can only resolve to objects already seen.
    fn is_linear_scan_mode(&self) -> bool;
}

/// A directory with no backing file.
///
/// Every reference resolves to `null` and registrations are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl ObjectDirectory for Detached {
    fn resolve(&mut self, _reference: ObjectRef) -> Result<Object> {
        Ok(Object::Null)
    }

    fn register(&mut self, _reference: ObjectRef, _value: Object) {}

    fn is_linear_scan_mode(&self) -> bool {
        false
    }
}

/// Cache of indirect objects with lazy, offset-based loading.
///
/// In random-access mode a miss looks the reference up in the
/// cross-reference table and parses the object at its offset with a fresh
/// [`Parser`]. Each object is parsed at most once. In linear-scan mode the
/// library only knows what has been registered so far.
pub struct Library {
    source: Option<SourceHandle>,
    xref: CrossRefTable,
    cache: HashMap<ObjectRef, Object>,
    resolving: HashSet<ObjectRef>,
    depth: u32,
    linear: bool,
    options: ParserOptions,
    factory: Arc<ObjectFactory>,
    fetches: usize,
    issues: Vec<ParseIssue>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.cache.len())
            .field("linear", &self.linear)
            .field("fetches", &self.fetches)
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Library over a random-access source.
    pub fn new(source: SourceHandle, xref: CrossRefTable, options: ParserOptions) -> Self {
        Self {
            source: Some(source),
            xref,
            cache: HashMap::new(),
            resolving: HashSet::new(),
            depth: 0,
            linear: false,
            options,
            factory: ObjectFactory::shared(),
            fetches: 0,
            issues: Vec::new(),
        }
    }

    /// Library for a linear scan. It is filled through
    /// [`register`](ObjectDirectory::register) only.
    pub fn linear(options: ParserOptions) -> Self {
        Self {
            source: None,
            xref: CrossRefTable::new(),
            cache: HashMap::new(),
            resolving: HashSet::new(),
            depth: 0,
            linear: true,
            options,
            factory: ObjectFactory::shared(),
            fetches: 0,
            issues: Vec::new(),
        }
    }

    /// Use a custom factory for objects loaded from now on.
    pub fn with_factory(mut self, factory: Arc<ObjectFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// The cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Replace the cross-reference table.
    pub fn set_xref(&mut self, xref: CrossRefTable) {
        self.xref = xref;
    }

    /// Parser options used for fetches.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// The factory handed to every fetch parser.
    pub fn factory(&self) -> &Arc<ObjectFactory> {
        &self.factory
    }

    /// Whether `reference` is already loaded.
    pub fn is_cached(&self, reference: ObjectRef) -> bool {
        self.cache.contains_key(&reference)
    }

    /// A loaded object, without fetching.
    pub fn cached(&self, reference: ObjectRef) -> Option<&Object> {
        self.cache.get(&reference)
    }

    /// Every loaded object.
    pub fn cached_objects(&self) -> impl Iterator<Item = (&ObjectRef, &Object)> {
        self.cache.iter()
    }

    /// Number of objects parsed from the source so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Issues recorded by fetch parsers.
    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    /// Resolve `obj` if it is a reference, otherwise return a copy.
    pub fn deref(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.resolve(*r),
            other => Ok(other.clone()),
        }
    }

    /// Run `load` with cycle and depth tracking for `reference`.
    fn guarded<F>(&mut self, reference: ObjectRef, load: F) -> Result<Object>
    where
        F: FnOnce(&mut Self) -> Result<Object>,
    {
        if self.resolving.contains(&reference) {
            log::warn!("Circular reference while loading {}", reference);
            return Err(Error::CircularReference(reference));
        }
        if self.depth >= self.options.max_recursion_depth {
            log::warn!(
                "Recursion depth limit exceeded ({}) while loading {}",
                self.options.max_recursion_depth,
                reference
            );
            return Err(Error::RecursionLimitExceeded(self.options.max_recursion_depth));
        }

        self.resolving.insert(reference);
        self.depth += 1;
        let result = load(self);
        self.depth -= 1;
        self.resolving.remove(&reference);
        result
    }

    fn fetch_at(&mut self, reference: ObjectRef, offset: u64) -> Result<Object> {
        let source = match &self.source {
            Some(source) => source.clone(),
            None => return Ok(Object::Null),
        };
        if offset >= source.len() {
            log::warn!("Object {} offset {} is past the end of input", reference, offset);
            return Ok(Object::Null);
        }

        log::debug!("Loading object {} at offset {}", reference, offset);
        self.fetches += 1;
        let mut parser = Parser::with_factory(source.cursor_at(offset), self.options, self.factory.clone());
        let parsed = parser.next_object(self);
        self.issues.extend(parser.take_issues());

        match parsed? {
            Some(Parsed::Indirect(obj)) if obj.reference == reference => {
                self.cache.insert(reference, obj.object.clone());
                Ok(obj.object)
            },
            Some(Parsed::Indirect(obj)) => {
                log::warn!(
                    "Expected object {} at offset {}, found {}",
                    reference,
                    offset,
                    obj.reference
                );
                Ok(Object::Null)
            },
            _ => {
                log::warn!("No object {} at offset {}", reference, offset);
                Ok(Object::Null)
            },
        }
    }

    fn fetch_compressed(&mut self, reference: ObjectRef, container: u32, index: u32) -> Result<Object> {
        let container_ref = ObjectRef::new(container, 0);
        let stream = match self.resolve(container_ref)? {
            Object::Stream(stream) => stream,
            other => {
                log::warn!(
                    "Object stream {} for {} is a {}",
                    container_ref,
                    reference,
                    other.type_name()
                );
                return Ok(Object::Null);
            },
        };

        let members = match objstm::parse_object_stream(&stream, &self.options, &self.factory) {
            Ok(members) => members,
            Err(e) if e.is_io() => return Err(e),
            Err(e) => {
                log::warn!("Cannot read object stream {}: {}", container_ref, e);
                return Ok(Object::Null);
            },
        };

        log::debug!(
            "Object stream {} holds {} objects (looking for {} at index {})",
            container_ref,
            members.len(),
            reference,
            index
        );
        for (number, value) in members {
            // Later updates may have moved a member out of this container
            let current = matches!(
                self.xref.get(number),
                Some(XRefEntry::Compressed { container: c, .. }) if *c == container
            );
            if current {
                self.cache.entry(ObjectRef::new(number, 0)).or_insert(value);
            }
        }

        Ok(self.cache.get(&reference).cloned().unwrap_or(Object::Null))
    }
}

impl ObjectDirectory for Library {
    fn resolve(&mut self, reference: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.cache.get(&reference) {
            return Ok(cached.clone());
        }
        if self.linear {
            return Ok(Object::Null);
        }

        let entry = match self.xref.lookup(reference) {
            Some(entry) => *entry,
            None => {
                log::debug!("Object {} not in cross-reference table", reference);
                return Ok(Object::Null);
            },
        };

        match entry {
            XRefEntry::Free { .. } => Ok(Object::Null),
            XRefEntry::InUse { offset, generation } => {
                if generation != reference.gen {
                    log::warn!(
                        "Reference {} has stale generation (table has {})",
                        reference,
                        generation
                    );
                    return Ok(Object::Null);
                }
                self.guarded(reference, |lib| lib.fetch_at(reference, offset))
            },
            XRefEntry::Compressed { container, index } => {
                if reference.gen != 0 {
                    log::warn!("Compressed object {} must have generation 0", reference);
                    return Ok(Object::Null);
                }
                self.guarded(reference, |lib| lib.fetch_compressed(reference, container, index))
            },
        }
    }

    fn register(&mut self, reference: ObjectRef, value: Object) {
        self.cache.insert(reference, value);
    }

    fn is_linear_scan_mode(&self) -> bool {
        self.linear
    }
}
