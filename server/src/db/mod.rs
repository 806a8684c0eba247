//! Database module for PostgreSQL persistence.

mod outcome;
mod pool;
mod query;
mod reconcile;

pub use outcome::*;
pub use pool::*;
pub use query::*;
pub use reconcile::*;
