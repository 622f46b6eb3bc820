//! Record store with stable identities.
//!
//! Every record gets a `RecordId` the first time the store sees it. Ids are
//! slot numbers in an append-only table: removing a record empties its slot,
//! the id is never handed out again. Views, selections, and pending edits
//! refer to records by id only, so no view can diverge from the stored content.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::target::{DocumentPath, TargetRef};
use crate::value::Value;

/// Field naming the document that owns a record
pub const DOCUMENT_PATH_FIELD: &str = "DocumentPath";
/// Persistent handle of the record's target object
pub const HANDLE_FIELD: &str = "Handle";
/// Direct (session-local) object id, preferred over the handle when present
pub const OBJECT_ID_FIELD: &str = "ObjectId";

/// Stable per-session record identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(usize);

impl RecordId {
    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A mutable key-value record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: FxHashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Display text of a column (empty when absent)
    pub fn text(&self, column: &str) -> String {
        self.fields.get(column).map(Value::display).unwrap_or_default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(column.into(), value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Owning document; records without the field belong to the current one
    pub fn document_path(&self) -> DocumentPath {
        match self.fields.get(DOCUMENT_PATH_FIELD) {
            Some(v) if !v.is_empty() => DocumentPath::new(v.display()),
            _ => DocumentPath::current(),
        }
    }

    /// Preferred way to find this record's target object
    pub fn target_ref(&self) -> Option<TargetRef> {
        self.target_refs().into_iter().next()
    }

    /// Every way to find this record's target object, in the order to try
    /// them: the cached object id, then the persistent handle
    pub fn target_refs(&self) -> Vec<TargetRef> {
        let mut refs = Vec::with_capacity(2);
        if let Some(id) = self
            .fields
            .get(OBJECT_ID_FIELD)
            .and_then(Value::as_number)
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        {
            refs.push(TargetRef::Id(id as u64));
        }
        match self.fields.get(HANDLE_FIELD) {
            Some(v) if !v.is_empty() => refs.push(TargetRef::Handle(v.display())),
            _ => {}
        }
        refs
    }
}

/// In-memory record table for one session
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    /// Slot per id; `None` once removed
    slots: Vec<Option<Record>>,
    /// Live ids in insertion order
    order: Vec<RecordId>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk load, assigning ids in input order
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Add a record and assign its identity
    pub fn insert(&mut self, record: Record) -> RecordId {
        let id = RecordId(self.slots.len());
        self.slots.push(Some(record));
        self.order.push(id);
        id
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Remove a record. Its id stays retired for the rest of the session.
    pub fn remove(&mut self, id: RecordId) -> Option<Record> {
        let record = self.slots.get_mut(id.0).and_then(Option::take)?;
        self.order.retain(|&other| other != id);
        Some(record)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Live ids in insertion order
    pub fn ids(&self) -> &[RecordId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.order
            .iter()
            .filter_map(move |&id| self.get(id).map(|record| (id, record)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_assigned_in_order() {
        let mut store = RecordStore::new();
        let a = store.insert(Record::new().with("Name", "a"));
        let b = store.insert(Record::new().with("Name", "b"));
        assert!(a < b);
        assert_eq!(store.ids(), &[a, b]);
        assert_eq!(store.get(b).unwrap().text("Name"), "b");
    }

    #[test]
    fn test_removed_id_never_reused() {
        let mut store = RecordStore::from_records(vec![Record::new(), Record::new()]);
        let first = store.ids()[0];
        store.remove(first);
        let c = store.insert(Record::new());
        assert_ne!(c, first);
        assert!(!store.contains(first));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_document_path_defaults_to_current() {
        let r = Record::new();
        assert!(r.document_path().is_current());
        let r = Record::new().with(DOCUMENT_PATH_FIELD, "");
        assert!(r.document_path().is_current());
        let r = Record::new().with(DOCUMENT_PATH_FIELD, "C:/x.dwg");
        assert_eq!(r.document_path().as_str(), "C:/x.dwg");
    }

    #[test]
    fn test_target_ref_prefers_object_id() {
        let r = Record::new().with(HANDLE_FIELD, "1F").with(OBJECT_ID_FIELD, 7.0);
        assert_eq!(r.target_ref(), Some(TargetRef::Id(7)));
        let r = Record::new().with(HANDLE_FIELD, "1F");
        assert_eq!(r.target_ref(), Some(TargetRef::Handle("1F".into())));
        assert_eq!(Record::new().target_ref(), None);
    }

    #[test]
    fn test_target_refs_id_then_handle() {
        let r = Record::new().with(HANDLE_FIELD, "1F").with(OBJECT_ID_FIELD, 7.0);
        assert_eq!(r.target_refs(), vec![TargetRef::Id(7), TargetRef::Handle("1F".into())]);
        let r = Record::new().with(OBJECT_ID_FIELD, -1.0);
        assert!(r.target_refs().is_empty());
    }
}
