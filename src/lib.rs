//! Permission-aware query compiler for issue and project listings.
//!
//! A [`Query`] holds filters, columns, sort and group settings. The
//! [`QueryEngine`] validates it against the field registry, compiles it into
//! a SQL predicate ANDed with the actor's visibility rules, and evaluates
//! results, counts and totals against a [`Storage`].

pub mod ast;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod model;
pub mod operators;
pub mod parser;
pub mod query;
pub mod registry;
pub mod sort;
pub mod storage;
pub mod token;
pub mod totals;
pub mod validator;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, IdentityProvider, MetadataProvider, RoleBasedSecurity, SecurityProvider};
pub use compiler::CompiledPredicate;
pub use config::EngineConfig;
pub use context::{Actor, EvalContext};
pub use engine::{Evaluation, QueryEngine};
pub use error::{FieldError, FieldErrorKind, QueryError, QueryResult};
pub use model::EntityKind;
pub use query::Query;
pub use sort::GroupKey;
pub use storage::{Dialect, SqliteStorage, Storage};
