//! Persistence layer (components H and I).
//!
//! Every repository function is generic over `sqlx::Executor<'c, Database = Postgres>`, so
//! call sites pass either `&pool` or `&mut *tx` without the repository layer caring which.

pub mod edges;
pub mod metadata;
pub mod nodes;
pub mod positions;
pub mod replace;
pub mod schema;

pub use schema::connect_and_migrate;
