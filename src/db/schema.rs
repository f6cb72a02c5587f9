//! Raw catalog rows returned by a [`CatalogSource`](super::CatalogSource)
//!
//! Rows are flat: multi-column objects arrive as one row per column and are
//! grouped by the snapshot builder.

/// One attribute of a base table
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnRow {
    pub table: String,
    pub name: String,
    /// Output of `format_type()`, e.g. `character varying(100)`
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    /// Attribute number, the table's natural column order
    pub ordinal: i16,
}

/// Constraint kinds that decorate columns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
}

impl ConstraintKind {
    /// Map a `pg_constraint.contype` code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "p" => Some(ConstraintKind::PrimaryKey),
            "u" => Some(ConstraintKind::Unique),
            "c" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

/// Membership of one column in a primary key, unique or check constraint
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintColumnRow {
    pub table: String,
    pub constraint_name: String,
    pub kind: ConstraintKind,
    pub column: String,
    /// `pg_get_constraintdef()` text, e.g. `CHECK ((price > 0))`
    pub definition: String,
}

/// One constrained/referenced column pair of a foreign key
#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyColumnRow {
    pub table: String,
    pub constraint_name: String,
    pub column: String,
    pub referred_table: String,
    pub referred_column: String,
    /// 1-based position within the constraint
    pub position: i64,
}

/// One key column of an index
#[derive(Clone, Debug, PartialEq)]
pub struct IndexColumnRow {
    pub table: String,
    pub index_name: String,
    /// Column name, or the expression text for expression keys
    pub column: String,
    /// 1-based position within the index key
    pub position: i32,
    pub is_unique: bool,
    pub is_primary: bool,
    /// `pg_get_indexdef()` text
    pub definition: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerRow {
    pub name: String,
    pub table: String,
    pub function: String,
    /// Raw `pg_trigger.tgtype` bitmask
    pub tgtype: i16,
    /// Raw `pg_trigger.tgenabled` code (`O`, `D`, `R`, `A`)
    pub enabled_code: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionRow {
    pub name: String,
    pub schema: String,
    pub arguments: String,
    /// `None` for procedures
    pub return_type: Option<String>,
    pub definition: String,
}

/// One label of an enumerated type
#[derive(Clone, Debug, PartialEq)]
pub struct EnumLabelRow {
    pub name: String,
    pub schema: String,
    pub label: String,
    /// `pg_enum.enumsortorder`, which follows declaration order
    pub sort_order: f32,
}
