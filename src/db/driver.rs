//! Catalog source abstraction trait
//!
//! Defines the read-only introspection interface the snapshot builder runs
//! against. Every method covers the whole target schema in one query.

use crate::db::{
    ColumnRow, ConstraintColumnRow, EnumLabelRow, ForeignKeyColumnRow, FunctionRow,
    IndexColumnRow, TriggerRow,
};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Namespace being introspected
    fn schema_name(&self) -> &str;

    /// Base tables (ordinary and partitioned), ordered by name
    async fn get_tables(&self) -> Result<Vec<String>>;

    /// Columns of every base table
    async fn get_columns(&self) -> Result<Vec<ColumnRow>>;

    /// Primary key, unique and check constraint memberships
    async fn get_constraint_columns(&self) -> Result<Vec<ConstraintColumnRow>>;

    async fn get_foreign_key_columns(&self) -> Result<Vec<ForeignKeyColumnRow>>;

    async fn get_functions(&self) -> Result<Vec<FunctionRow>>;

    async fn get_triggers(&self) -> Result<Vec<TriggerRow>>;

    async fn get_enum_labels(&self) -> Result<Vec<EnumLabelRow>>;

    /// Key columns of every index on a base table, primary keys included
    async fn get_index_columns(&self) -> Result<Vec<IndexColumnRow>>;
}
