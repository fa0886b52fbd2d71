//! Query construction for leanorm.
//!
//! `leanorm-query` turns a declarative fetch parameter map into SQL text plus
//! positional bind values:
//!
//! - [`Conditions`] compiles nested AND/OR predicate lists for WHERE and HAVING
//! - [`FetchParams`] is the fetch parameter map (`cols`, `where`, `order`, ...)
//! - [`SelectBuilder`] assembles the full SELECT statement
//!
//! Nothing here executes SQL; the results go to an
//! [`Executor`](leanorm_core::Executor).

pub mod condition;
pub mod join;
pub mod params;
pub mod select;

pub use condition::{
    CompiledCondition, Condition, ConditionKey, Conditions, Operator, Predicate, Quoter,
};
pub use join::{Join, JoinType};
pub use params::{FetchParams, ParamKey};
pub use select::{SelectBuilder, SelectQuery};
