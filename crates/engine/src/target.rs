//! Target objects and the document host boundary.
//!
//! Records in the grid describe objects that live in host documents. At
//! commit time each edit is routed to its document, the document is locked,
//! and the record's target is resolved inside that lock. `MemoryDocuments`
//! is the in-process host used by the CLI (backed by a drawing file) and by
//! tests.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::edit::ATTRIBUTE_PREFIX;
use crate::error::LockError;
use crate::record::{Record, DOCUMENT_PATH_FIELD, HANDLE_FIELD, OBJECT_ID_FIELD};
use crate::value::Value;

/// Identifies the document that owns a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub const CURRENT: &'static str = "current";

    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn current() -> Self {
        Self(Self::CURRENT.to_string())
    }

    pub fn is_current(&self) -> bool {
        self.0 == Self::CURRENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a record points at its target object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetRef {
    /// Direct object id, valid while the document is open
    Id(u64),
    /// Persistent handle string
    Handle(String),
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Id(id) => write!(f, "id {}", id),
            TargetRef::Handle(h) => write!(f, "handle {}", h),
        }
    }
}

/// Runtime variant of a target object, used for handler dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKind {
    Layer,
    BlockDefinition,
    BlockReference,
    Line,
    Circle,
    Text,
    Polyline,
}

impl TargetKind {
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Layer => "Layer",
            TargetKind::BlockDefinition => "BlockDefinition",
            TargetKind::BlockReference => "BlockReference",
            TargetKind::Line => "Line",
            TargetKind::Circle => "Circle",
            TargetKind::Text => "Text",
            TargetKind::Polyline => "Polyline",
        }
    }

    pub const ALL: [TargetKind; 7] = [
        TargetKind::Layer,
        TargetKind::BlockDefinition,
        TargetKind::BlockReference,
        TargetKind::Line,
        TargetKind::Circle,
        TargetKind::Text,
        TargetKind::Polyline,
    ];

    /// Kinds that carry layer/color/linetype
    pub fn is_entity(self) -> bool {
        !matches!(self, TargetKind::Layer | TargetKind::BlockDefinition)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Properties shared by drawable entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityProps {
    pub layer: String,
    pub color: String,
    pub linetype: String,
}

impl Default for EntityProps {
    fn default() -> Self {
        Self {
            layer: "0".to_string(),
            color: "ByLayer".to_string(),
            linetype: "ByLayer".to_string(),
        }
    }
}

/// A host object that edits are applied to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TargetObject {
    Layer {
        name: String,
        #[serde(default)]
        color: String,
        #[serde(default)]
        linetype: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        frozen: bool,
    },
    BlockDefinition {
        name: String,
        #[serde(default)]
        description: String,
    },
    BlockReference {
        #[serde(flatten)]
        props: EntityProps,
        block_name: String,
        position: Point,
        #[serde(default)]
        rotation: f64,
        #[serde(default = "unit_scale")]
        scale: f64,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    Line {
        #[serde(flatten)]
        props: EntityProps,
        start: Point,
        end: Point,
    },
    Circle {
        #[serde(flatten)]
        props: EntityProps,
        center: Point,
        radius: f64,
    },
    Text {
        #[serde(flatten)]
        props: EntityProps,
        contents: String,
        position: Point,
        #[serde(default = "unit_scale")]
        height: f64,
        #[serde(default)]
        rotation: f64,
    },
    Polyline {
        #[serde(flatten)]
        props: EntityProps,
        vertices: Vec<Point>,
        #[serde(default)]
        closed: bool,
    },
}

fn unit_scale() -> f64 {
    1.0
}

impl TargetObject {
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetObject::Layer { .. } => TargetKind::Layer,
            TargetObject::BlockDefinition { .. } => TargetKind::BlockDefinition,
            TargetObject::BlockReference { .. } => TargetKind::BlockReference,
            TargetObject::Line { .. } => TargetKind::Line,
            TargetObject::Circle { .. } => TargetKind::Circle,
            TargetObject::Text { .. } => TargetKind::Text,
            TargetObject::Polyline { .. } => TargetKind::Polyline,
        }
    }

    pub fn props(&self) -> Option<&EntityProps> {
        match self {
            TargetObject::BlockReference { props, .. }
            | TargetObject::Line { props, .. }
            | TargetObject::Circle { props, .. }
            | TargetObject::Text { props, .. }
            | TargetObject::Polyline { props, .. } => Some(props),
            TargetObject::Layer { .. } | TargetObject::BlockDefinition { .. } => None,
        }
    }

    pub fn props_mut(&mut self) -> Option<&mut EntityProps> {
        match self {
            TargetObject::BlockReference { props, .. }
            | TargetObject::Line { props, .. }
            | TargetObject::Circle { props, .. }
            | TargetObject::Text { props, .. }
            | TargetObject::Polyline { props, .. } => Some(props),
            TargetObject::Layer { .. } | TargetObject::BlockDefinition { .. } => None,
        }
    }

    /// Describe the object as grid columns
    pub fn fill_record(&self, record: &mut Record) {
        record.set("Type", Value::text(self.kind().name()));
        if let Some(props) = self.props() {
            record.set("Layer", Value::text(props.layer.clone()));
            record.set("Color", Value::text(props.color.clone()));
            record.set("Linetype", Value::text(props.linetype.clone()));
        }
        match self {
            TargetObject::Layer { name, color, linetype, description, frozen } => {
                record.set("Name", Value::text(name.clone()));
                record.set("Color", Value::text(color.clone()));
                record.set("Linetype", Value::text(linetype.clone()));
                record.set("Description", Value::text(description.clone()));
                record.set("Frozen", Value::Bool(*frozen));
            }
            TargetObject::BlockDefinition { name, description } => {
                record.set("Name", Value::text(name.clone()));
                record.set("Description", Value::text(description.clone()));
            }
            TargetObject::BlockReference { block_name, position, rotation, scale, attributes, .. } => {
                record.set("Name", Value::text(block_name.clone()));
                record.set("CenterX", Value::Number(position.x));
                record.set("CenterY", Value::Number(position.y));
                record.set("Rotation", Value::Number(*rotation));
                record.set("Scale", Value::Number(*scale));
                for (tag, value) in attributes {
                    record.set(format!("{}{}", ATTRIBUTE_PREFIX, tag), Value::text(value.clone()));
                }
            }
            TargetObject::Line { start, end, .. } => {
                record.set("CenterX", Value::Number((start.x + end.x) / 2.0));
                record.set("CenterY", Value::Number((start.y + end.y) / 2.0));
                record.set("Length", Value::Number(start.distance(*end)));
            }
            TargetObject::Circle { center, radius, .. } => {
                record.set("CenterX", Value::Number(center.x));
                record.set("CenterY", Value::Number(center.y));
                record.set("Radius", Value::Number(*radius));
            }
            TargetObject::Text { contents, position, height, rotation, .. } => {
                record.set("Contents", Value::text(contents.clone()));
                record.set("CenterX", Value::Number(position.x));
                record.set("CenterY", Value::Number(position.y));
                record.set("Height", Value::Number(*height));
                record.set("Rotation", Value::Number(*rotation));
            }
            TargetObject::Polyline { vertices, closed, .. } => {
                record.set("Vertices", Value::Number(vertices.len() as f64));
                record.set("Closed", Value::Bool(*closed));
            }
        }
    }
}

/// Write access to one locked document
pub trait DocumentTxn {
    fn resolve(&mut self, target: &TargetRef) -> Option<&mut TargetObject>;
}

/// The host's document store and its locking discipline
pub trait DocumentHost {
    /// Lock `document`, run `action` inside the lock, then release it.
    /// Whatever the action changed is kept.
    fn with_document_lock(
        &mut self,
        document: &DocumentPath,
        action: &mut dyn FnMut(&mut dyn DocumentTxn),
    ) -> Result<(), LockError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: u64,
    pub handle: String,
    pub object: TargetObject,
}

impl StoredObject {
    fn matches(&self, target: &TargetRef) -> bool {
        match target {
            TargetRef::Id(id) => self.id == *id,
            TargetRef::Handle(h) => self.handle.eq_ignore_ascii_case(h),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocumentPath,
    #[serde(default)]
    pub read_only: bool,
    pub objects: Vec<StoredObject>,
}

impl Document {
    pub fn new(path: DocumentPath) -> Self {
        Self {
            path,
            read_only: false,
            objects: Vec::new(),
        }
    }

    /// Add an object with the next id and a hex handle
    pub fn add(&mut self, object: TargetObject) -> u64 {
        let id = self.objects.iter().map(|o| o.id).max().map_or(1, |m| m + 1);
        self.objects.push(StoredObject {
            id,
            handle: format!("{:X}", id + 0x1F),
            object,
        });
        id
    }

    pub fn find(&self, target: &TargetRef) -> Option<&TargetObject> {
        self.objects.iter().find(|o| o.matches(target)).map(|o| &o.object)
    }

    pub fn remove(&mut self, target: &TargetRef) -> Option<StoredObject> {
        let pos = self.objects.iter().position(|o| o.matches(target))?;
        Some(self.objects.remove(pos))
    }

    /// One record per object, carrying the fields commit needs to route back
    pub fn records(&self) -> Vec<Record> {
        self.objects
            .iter()
            .map(|stored| {
                let mut record = Record::new()
                    .with(HANDLE_FIELD, stored.handle.clone())
                    .with(OBJECT_ID_FIELD, stored.id as f64);
                if !self.path.is_current() {
                    record.set(DOCUMENT_PATH_FIELD, Value::text(self.path.as_str()));
                }
                stored.object.fill_record(&mut record);
                record
            })
            .collect()
    }
}

impl DocumentTxn for Document {
    fn resolve(&mut self, target: &TargetRef) -> Option<&mut TargetObject> {
        self.objects
            .iter_mut()
            .find(|o| o.matches(target))
            .map(|o| &mut o.object)
    }
}

/// In-process document host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocuments {
    documents: BTreeMap<DocumentPath, Document>,
    /// Documents locked so far, in lock order
    #[serde(skip)]
    lock_log: Vec<DocumentPath>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: Document) {
        self.documents.insert(document.path.clone(), document);
    }

    pub fn get(&self, path: &DocumentPath) -> Option<&Document> {
        self.documents.get(path)
    }

    pub fn get_mut(&mut self, path: &DocumentPath) -> Option<&mut Document> {
        self.documents.get_mut(path)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// Records for every object of every document, current document first
    pub fn records(&self) -> Vec<Record> {
        let current = self.documents.get(&DocumentPath::current());
        current
            .into_iter()
            .chain(self.documents.values().filter(|d| !d.path.is_current()))
            .flat_map(Document::records)
            .collect()
    }

    /// Remove the object a record was derived from
    pub fn remove_record(&mut self, record: &Record) -> bool {
        let Some(document) = self.documents.get_mut(&record.document_path()) else {
            return false;
        };
        record
            .target_refs()
            .iter()
            .any(|target| document.remove(target).is_some())
    }

    pub fn lock_log(&self) -> &[DocumentPath] {
        &self.lock_log
    }
}

impl DocumentHost for MemoryDocuments {
    fn with_document_lock(
        &mut self,
        document: &DocumentPath,
        action: &mut dyn FnMut(&mut dyn DocumentTxn),
    ) -> Result<(), LockError> {
        let Some(doc) = self.documents.get_mut(document) else {
            return Err(LockError {
                document: document.clone(),
                reason: "document is not open".to_string(),
            });
        };
        if doc.read_only {
            return Err(LockError {
                document: document.clone(),
                reason: "document is read-only".to_string(),
            });
        }
        self.lock_log.push(document.clone());
        action(doc);
        Ok(())
    }
}
