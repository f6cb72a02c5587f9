//! The snapshot document written to disk
//!
//! Field names are the JSON keys consumers rely on; do not rename them.

use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub tables: Vec<Table>,
    pub foreign_keys: Vec<ForeignKey>,
    pub functions: Vec<Function>,
    pub triggers: Vec<Trigger>,
    pub enums: Vec<Enum>,
    pub indexes: Vec<Index>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Table {
    pub table_name: String,
    pub columns: Vec<Column>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub check_constraints: Vec<String>,
}

/// `constrained_columns[i]` references `referred_columns[i]`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForeignKey {
    pub table: String,
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Function {
    pub function_name: String,
    pub schema: String,
    pub arguments: String,
    pub return_type: Option<String>,
    pub definition: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trigger {
    pub trigger_name: String,
    pub table: String,
    pub function: String,
    pub events: Vec<String>,
    pub orientation: Orientation,
    pub enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
    Row,
    Statement,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Enum {
    pub name: String,
    pub schema: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Index {
    pub table: String,
    pub index_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub definition: String,
}
