//! Background services behind the attendance view.

pub mod bulk;
pub mod query;

pub use bulk::{BulkEvent, BulkMutationEngine, BulkOutcome};
pub use query::{LoadedScope, QueryState, ScopeQuery};
