/// Model metadata: fields, schemas and the registry that owns them.
mod field;
mod naming;
mod schema;

pub use field::*;
pub use naming::*;
pub use schema::*;
