/// Query algebra and the SQL compilers.
///
/// ```text
/// Query / Condition   (types.rs)
///       ↓
/// Query Compiler      (compiler.rs, condition.rs)
///       ↓
/// Statement + params  (dialect.rs)
///       ↓
/// Executor            (db/ module)
/// ```
///
/// Schemas compile separately into DDL (ddl.rs), using the type mapper in
/// column.rs.
pub mod column;
pub mod compiler;
pub mod condition;
pub mod ddl;
pub mod dialect;
pub mod types;

// Re-export key types for convenience
pub use compiler::{compile_query, count_statement, select_statement, QueryParts};
pub use condition::compile_condition;
pub use ddl::{compile_create, create_statements, CreateDefinition};
pub use dialect::{Bindings, Dialect, SqlParam, Statement};
pub use types::*;
