//! Backend-neutral query representation.

pub mod operators;
pub mod predicate;
pub mod query;

pub use operators::{Action, AggregateFunc, CompareOp, JoinKind, Operator, SortOrder};
pub use predicate::Predicate;
pub use query::{Join, OrderBy, Projection, Query};
