mod connection;
mod database;
mod executor;
mod normalize;
mod query;
mod relation;
mod schema;

pub use connection::*;
pub use database::{Database, DeleteResult, QueryOptions, QueryResult};
pub use executor::*;
pub use normalize::{coerce_scalar, decode_row, parse_json};
pub use query::*;
pub use relation::RelationTarget;
pub use schema::*;
