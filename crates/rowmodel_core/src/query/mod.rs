//! Query specifications, conditions and finder parameters.
//!
//! Nothing in this module talks to a store. It only describes reads
//! ([`QuerySpec`]) and bulk-write predicates ([`Predicate`]) in a form any
//! [`Connection`](crate::Connection) can execute.

mod condition;
mod params;
mod spec;

pub use condition::{Clause, Condition, Conditions, Operator, Predicate};
pub use params::{Lookup, Params};
pub use spec::{
    escape_identifier, is_identifier, Aggregate, AggregateArg, AggregateFn, Criteria, Direction,
    Filter, OrderBy, QuerySpec,
};
