pub mod clipboard;
pub mod commit;
pub mod debounce;
pub mod edit;
pub mod error;
pub mod handlers;
pub mod index;
pub mod query;
pub mod record;
pub mod session;
pub mod sort;
pub mod target;
pub mod transform;
pub mod value;
pub mod view;

pub use error::{ApplyError, EngineError, LockError};
pub use record::{Record, RecordId, RecordStore};
pub use session::{Session, SessionOptions, SessionOutcome};
pub use value::Value;
