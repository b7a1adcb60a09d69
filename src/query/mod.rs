// ============================================================================
// Declarative Queries
// ============================================================================
//
// A query method is fully described by a `QueryDescriptor`: SQL text, or a
// filter expression over the repository's entity, plus its result shape.
// The body of such a method is never run.
//
// ============================================================================

pub mod descriptor;
pub mod executor;
pub mod mapping;
pub mod paging;
pub mod repository;

pub use descriptor::{CompiledQuery, EntityMeta, QueryDescriptor, QuerySource, RepositoryMeta};
pub use executor::{QueryExecutor, QueryOutcome};
pub use mapping::FromRecord;
pub use paging::{Direction, Page, PageRequest, Sort};
pub use repository::Repository;
