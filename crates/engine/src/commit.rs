//! Commit pipeline: pending edits -> host documents.
//!
//! Edits are grouped by the document that owns their record. The current
//! document goes first, then the others in path order. Each document is
//! locked once for its whole batch. A failing edit never stops the rest of
//! its batch, and a document that cannot be locked never stops the other
//! documents.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::edit::EditKey;
use crate::handlers::{ApplyOutcome, HandlerTable};
use crate::record::{RecordId, RecordStore};
use crate::target::{DocumentHost, DocumentPath, DocumentTxn};

/// Why one edit (or one document's batch) did not apply
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitFailure {
    #[error("{id} {column}: target object not found")]
    Unresolved { id: RecordId, column: String },
    #[error("{id} {column}: {message}")]
    Apply {
        id: RecordId,
        column: String,
        message: String,
    },
    #[error("{id} {column}: {message}")]
    Unsupported {
        id: RecordId,
        column: String,
        message: String,
    },
    #[error("{message} ({edits} edit(s) skipped)")]
    Lock {
        document: DocumentPath,
        message: String,
        edits: usize,
    },
}

/// Outcome of one commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<CommitFailure>,
    /// Documents whose batch ran, in processing order
    pub documents: Vec<DocumentPath>,
}

impl CommitReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    pub fn summary(&self) -> String {
        format!("{} of {} edits applied", self.succeeded, self.attempted)
    }
}

#[derive(Debug)]
struct PendingEdit {
    id: RecordId,
    column: String,
    value: String,
}

/// Group edits by owning document, current document first
fn group_by_document(
    pending: BTreeMap<EditKey, String>,
    store: &RecordStore,
    report: &mut CommitReport,
) -> Vec<(DocumentPath, Vec<PendingEdit>)> {
    let mut groups: BTreeMap<DocumentPath, Vec<PendingEdit>> = BTreeMap::new();
    for (key, value) in pending {
        let Some(record) = store.get(key.id) else {
            log::warn!("commit: {} was removed before commit", key.id);
            report.failures.push(CommitFailure::Unresolved {
                id: key.id,
                column: key.column,
            });
            continue;
        };
        groups.entry(record.document_path()).or_default().push(PendingEdit {
            id: key.id,
            column: key.column,
            value,
        });
    }

    let mut ordered = Vec::with_capacity(groups.len());
    if let Some(current) = groups.remove(&DocumentPath::current()) {
        ordered.push((DocumentPath::current(), current));
    }
    ordered.extend(groups);
    ordered
}

fn apply_one(
    txn: &mut dyn DocumentTxn,
    edit: &PendingEdit,
    store: &RecordStore,
    handlers: &HandlerTable,
) -> Result<(), CommitFailure> {
    let unresolved = || CommitFailure::Unresolved {
        id: edit.id,
        column: edit.column.clone(),
    };
    let record = store.get(edit.id).ok_or_else(unresolved)?;
    // a stale object id falls back to the persistent handle
    let target_ref = record
        .target_refs()
        .into_iter()
        .find(|r| txn.resolve(r).is_some())
        .ok_or_else(unresolved)?;
    let target = txn.resolve(&target_ref).ok_or_else(unresolved)?;

    match handlers.dispatch(target, &edit.column, &edit.value, record) {
        Ok(ApplyOutcome::Applied) | Ok(ApplyOutcome::Unchanged) => Ok(()),
        Ok(ApplyOutcome::Unsupported(message)) => Err(CommitFailure::Unsupported {
            id: edit.id,
            column: edit.column.clone(),
            message,
        }),
        Err(e) => Err(CommitFailure::Apply {
            id: edit.id,
            column: edit.column.clone(),
            message: e.to_string(),
        }),
    }
}

/// Apply `pending` through `host`. Nothing is locked when `pending` is empty.
pub fn run(
    pending: BTreeMap<EditKey, String>,
    store: &RecordStore,
    host: &mut dyn DocumentHost,
    handlers: &HandlerTable,
) -> CommitReport {
    let mut report = CommitReport {
        attempted: pending.len(),
        ..CommitReport::default()
    };
    if pending.is_empty() {
        return report;
    }

    for (document, edits) in group_by_document(pending, store, &mut report) {
        let mut results: Vec<Result<(), CommitFailure>> = Vec::with_capacity(edits.len());
        let locked = host.with_document_lock(&document, &mut |txn: &mut dyn DocumentTxn| {
            results.clear();
            for edit in &edits {
                results.push(apply_one(txn, edit, store, handlers));
            }
        });

        match locked {
            Ok(()) => {
                let mut applied = 0;
                for result in results {
                    match result {
                        Ok(()) => applied += 1,
                        Err(failure) => {
                            log::warn!("commit: {}", failure);
                            report.failures.push(failure);
                        }
                    }
                }
                log::debug!("commit: {} of {} edit(s) applied in {}", applied, edits.len(), document);
                report.succeeded += applied;
                report.documents.push(document);
            }
            Err(e) => {
                log::warn!("commit: {}", e);
                report.failures.push(CommitFailure::Lock {
                    document: e.document.clone(),
                    message: e.to_string(),
                    edits: edits.len(),
                });
            }
        }
    }

    log::info!("commit: {}", report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use crate::record::Record;
    use crate::target::{Document, EntityProps, MemoryDocuments, Point, TargetObject, TargetRef};

    fn circle(r: f64) -> TargetObject {
        TargetObject::Circle {
            props: EntityProps::default(),
            center: Point::new(0.0, 0.0),
            radius: r,
        }
    }

    fn host_with(paths: &[&str]) -> MemoryDocuments {
        let mut host = MemoryDocuments::new();
        for path in paths {
            let mut doc = Document::new(DocumentPath::new(*path));
            doc.add(circle(1.0));
            doc.add(circle(2.0));
            host.insert(doc);
        }
        host
    }

    fn pending(store: &RecordStore, edits: &[(usize, &str, &str)]) -> BTreeMap<EditKey, String> {
        edits
            .iter()
            .map(|&(i, col, v)| {
                (
                    EditKey {
                        id: store.ids()[i],
                        column: col.to_string(),
                    },
                    v.to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_commit_locks_nothing() {
        let store = RecordStore::new();
        let mut host = host_with(&["current"]);
        let report = run(BTreeMap::new(), &store, &mut host, &HandlerTable::with_defaults());
        assert_eq!(report, CommitReport::default());
        assert!(host.lock_log().is_empty());
    }

    #[test]
    fn test_current_document_first_and_locked_once() {
        let mut host = host_with(&["current", "a.dwg", "b.dwg"]);
        let store = RecordStore::from_records(host.records());
        // records(): current first, then a.dwg, b.dwg, two objects each
        let edits = pending(&store, &[(4, "Radius", "5"), (0, "Radius", "3"), (2, "Radius", "4"), (5, "Radius", "6")]);
        let report = run(edits, &store, &mut host, &HandlerTable::with_defaults());
        assert_eq!(report.summary(), "4 of 4 edits applied");
        assert_eq!(
            host.lock_log(),
            &[DocumentPath::current(), DocumentPath::new("a.dwg"), DocumentPath::new("b.dwg")]
        );
        let b = host.get(&DocumentPath::new("b.dwg")).unwrap();
        assert!(matches!(b.find(&TargetRef::Id(1)), Some(TargetObject::Circle { radius, .. }) if *radius == 5.0));
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let mut host = host_with(&["current"]);
        let store = RecordStore::from_records(host.records());
        let edits = pending(&store, &[(0, "Radius", "abc"), (1, "Radius", "7"), (1, "Contents", "x")]);
        let report = run(edits, &store, &mut host, &HandlerTable::with_defaults());
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 2);
        assert!(report.failures.iter().any(|f| matches!(f, CommitFailure::Apply { .. })));
        assert!(report.failures.iter().any(|f| matches!(f, CommitFailure::Unsupported { .. })));
    }

    #[test]
    fn test_lock_failure_skips_only_that_document() {
        let mut host = host_with(&["current", "locked.dwg"]);
        host.get_mut(&DocumentPath::new("locked.dwg")).unwrap().read_only = true;
        let store = RecordStore::from_records(host.records());
        let edits = pending(&store, &[(0, "Radius", "9"), (2, "Radius", "9"), (3, "Radius", "9")]);
        let report = run(edits, &store, &mut host, &HandlerTable::with_defaults());
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.documents, vec![DocumentPath::current()]);
        assert!(matches!(
            &report.failures[..],
            [CommitFailure::Lock { edits: 2, .. }]
        ));
    }

    #[test]
    fn test_unresolved_handle() {
        let mut host = host_with(&["current"]);
        let store = RecordStore::from_records(vec![Record::new().with("Handle", "FFFF").with("Radius", 1.0)]);
        let report = run(pending(&store, &[(0, "Radius", "2")]), &store, &mut host, &HandlerTable::with_defaults());
        assert_eq!(report.succeeded, 0);
        assert!(matches!(report.failures[0], CommitFailure::Unresolved { .. }));
    }

    #[test]
    fn test_stale_object_id_falls_back_to_handle() {
        let mut host = host_with(&["current"]);
        let handle = host.records()[0].text("Handle");
        let store = RecordStore::from_records(vec![Record::new()
            .with("Handle", handle)
            .with("ObjectId", 999.0)
            .with("Radius", 1.0)]);
        let report = run(pending(&store, &[(0, "Radius", "5")]), &store, &mut host, &HandlerTable::with_defaults());
        assert_eq!(report.summary(), "1 of 1 edits applied");
        let current = host.get(&DocumentPath::current()).unwrap();
        assert!(matches!(current.find(&TargetRef::Id(1)), Some(TargetObject::Circle { radius, .. }) if *radius == 5.0));
    }

    struct Unavailable;

    impl DocumentHost for Unavailable {
        fn with_document_lock(
            &mut self,
            document: &DocumentPath,
            _action: &mut dyn FnMut(&mut dyn DocumentTxn),
        ) -> Result<(), LockError> {
            Err(LockError {
                document: document.clone(),
                reason: "busy".into(),
            })
        }
    }

    #[test]
    fn test_custom_host_lock_error() {
        let store = RecordStore::from_records(vec![Record::new().with("Handle", "20")]);
        let report = run(pending(&store, &[(0, "Radius", "2")]), &store, &mut Unavailable, &HandlerTable::with_defaults());
        assert_eq!(report.summary(), "0 of 1 edits applied");
        assert_eq!(report.failures[0].to_string(), "cannot lock current: busy (1 edit(s) skipped)");
    }
}
