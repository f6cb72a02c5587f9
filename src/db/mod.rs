//! Database module — catalog source trait + PostgreSQL backend

mod driver;
mod schema;
pub mod postgres;
pub mod types;

pub use driver::*;
pub use schema::*;
