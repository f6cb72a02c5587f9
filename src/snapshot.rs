//! Schema snapshot builder
//!
//! Runs each catalog extraction in turn against a [`CatalogSource`] and
//! shapes the raw rows into the [`Snapshot`] document. The extraction
//! functions are independent; the shaping functions are pure so they can be
//! exercised without a database.

use crate::db::{
    CatalogSource, ColumnRow, ConstraintColumnRow, ConstraintKind, EnumLabelRow,
    ForeignKeyColumnRow, FunctionRow, IndexColumnRow, TriggerRow,
};
use crate::db::types::render_type;
use crate::document::{
    Column, Enum, ForeignKey, Function, Index, Orientation, Snapshot, Table, Trigger,
};
use crate::error::{Category, Result, SnapshotError};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::info;

/// Build the full document. The first failing query aborts the build.
pub async fn build_snapshot<C>(catalog: &C) -> Result<Snapshot>
where
    C: CatalogSource + ?Sized,
{
    info!(schema = catalog.schema_name(), "extracting catalog metadata");

    let snapshot = Snapshot {
        tables: extract_tables(catalog).await?,
        foreign_keys: extract_foreign_keys(catalog).await?,
        functions: extract_functions(catalog).await?,
        triggers: extract_triggers(catalog).await?,
        enums: extract_enums(catalog).await?,
        indexes: extract_indexes(catalog).await?,
    };

    info!(
        tables = snapshot.tables.len(),
        foreign_keys = snapshot.foreign_keys.len(),
        functions = snapshot.functions.len(),
        triggers = snapshot.triggers.len(),
        enums = snapshot.enums.len(),
        indexes = snapshot.indexes.len(),
        "catalog extracted"
    );

    Ok(snapshot)
}

pub async fn extract_tables<C: CatalogSource + ?Sized>(catalog: &C) -> Result<Vec<Table>> {
    let names = catalog.get_tables().await?;
    let columns = catalog.get_columns().await?;
    let constraints = catalog.get_constraint_columns().await?;
    Ok(assemble_tables(names, columns, &constraints))
}

pub async fn extract_foreign_keys<C: CatalogSource + ?Sized>(catalog: &C) -> Result<Vec<ForeignKey>> {
    assemble_foreign_keys(catalog.get_foreign_key_columns().await?)
}

pub async fn extract_functions<C: CatalogSource + ?Sized>(catalog: &C) -> Result<Vec<Function>> {
    Ok(assemble_functions(catalog.get_functions().await?))
}

pub async fn extract_triggers<C: CatalogSource + ?Sized>(catalog: &C) -> Result<Vec<Trigger>> {
    Ok(assemble_triggers(catalog.get_triggers().await?))
}

pub async fn extract_enums<C: CatalogSource + ?Sized>(catalog: &C) -> Result<Vec<Enum>> {
    Ok(assemble_enums(catalog.get_enum_labels().await?))
}

pub async fn extract_indexes<C: CatalogSource + ?Sized>(catalog: &C) -> Result<Vec<Index>> {
    assemble_indexes(catalog.get_index_columns().await?)
}

// ---- shaping ----

/// Group rows by key, keeping groups in first-seen order
fn group_by<R, K, F>(rows: impl IntoIterator<Item = R>, key: F) -> Vec<(K, Vec<R>)>
where
    K: Hash + Eq + Clone,
    F: Fn(&R) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<R>)> = Vec::new();
    for row in rows {
        let k = key(&row);
        match slots.get(&k) {
            Some(&i) => groups[i].1.push(row),
            None => {
                slots.insert(k.clone(), groups.len());
                groups.push((k, vec![row]));
            }
        }
    }
    groups
}

pub fn assemble_tables(
    names: Vec<String>,
    columns: Vec<ColumnRow>,
    constraints: &[ConstraintColumnRow],
) -> Vec<Table> {
    let mut by_table: HashMap<String, Vec<ColumnRow>> = group_by(columns, |c| c.table.clone())
        .into_iter()
        .collect();

    let has = |table: &str, column: &str, kinds: &[ConstraintKind]| {
        constraints
            .iter()
            .any(|c| c.table == table && c.column == column && kinds.contains(&c.kind))
    };

    names
        .into_iter()
        .map(|table_name| {
            let mut rows = by_table.remove(&table_name).unwrap_or_default();
            rows.sort_by_key(|c| c.ordinal);

            let columns = rows
                .into_iter()
                .map(|row| {
                    let checks = constraints
                        .iter()
                        .filter(|c| {
                            c.kind == ConstraintKind::Check
                                && c.table == table_name
                                && c.column == row.name
                        })
                        .map(|c| c.definition.clone())
                        .collect();

                    Column {
                        is_primary_key: has(&table_name, &row.name, &[ConstraintKind::PrimaryKey]),
                        is_unique: has(
                            &table_name,
                            &row.name,
                            &[ConstraintKind::PrimaryKey, ConstraintKind::Unique],
                        ),
                        check_constraints: checks,
                        data_type: render_type(&row.data_type),
                        is_nullable: row.is_nullable,
                        default: row.default,
                        name: row.name,
                    }
                })
                .collect();

            Table {
                table_name,
                columns,
            }
        })
        .collect()
}

pub fn assemble_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Result<Vec<ForeignKey>> {
    let mut groups = group_by(rows, |r| (r.table.clone(), r.constraint_name.clone()));
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    groups
        .into_iter()
        .map(|((table, constraint), mut pairs)| {
            pairs.sort_by_key(|p| p.position);

            let referred_table = pairs[0].referred_table.clone();
            if pairs.iter().any(|p| p.referred_table != referred_table) {
                return Err(SnapshotError::shape(
                    Category::ForeignKeys,
                    format!("{}.{} references more than one table", table, constraint),
                ));
            }

            let (constrained_columns, referred_columns): (Vec<String>, Vec<String>) = pairs
                .into_iter()
                .map(|p| (p.column, p.referred_column))
                .unzip();

            Ok(ForeignKey {
                table,
                constrained_columns,
                referred_table,
                referred_columns,
            })
        })
        .collect()
}

pub fn assemble_functions(mut rows: Vec<FunctionRow>) -> Vec<Function> {
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows.into_iter()
        .map(|row| Function {
            function_name: row.name,
            schema: row.schema,
            arguments: row.arguments,
            return_type: row.return_type,
            definition: row.definition,
        })
        .collect()
}

// pg_trigger.tgtype bits
const TRIGGER_TYPE_ROW: i16 = 1 << 0;
const TRIGGER_TYPE_BEFORE: i16 = 1 << 1;
const TRIGGER_TYPE_INSERT: i16 = 1 << 2;
const TRIGGER_TYPE_DELETE: i16 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i16 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i16 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i16 = 1 << 6;

/// Decode a `tgtype` bitmask into its events (`"AFTER INSERT"`, ...) and orientation
pub fn decode_trigger_type(tgtype: i16) -> (Vec<String>, Orientation) {
    let timing = if tgtype & TRIGGER_TYPE_BEFORE != 0 {
        "BEFORE"
    } else if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
        "INSTEAD OF"
    } else {
        "AFTER"
    };

    let events = [
        (TRIGGER_TYPE_INSERT, "INSERT"),
        (TRIGGER_TYPE_DELETE, "DELETE"),
        (TRIGGER_TYPE_UPDATE, "UPDATE"),
        (TRIGGER_TYPE_TRUNCATE, "TRUNCATE"),
    ]
    .into_iter()
    .filter(|(bit, _)| tgtype & bit != 0)
    .map(|(_, event)| format!("{} {}", timing, event))
    .collect();

    let orientation = if tgtype & TRIGGER_TYPE_ROW != 0 {
        Orientation::Row
    } else {
        Orientation::Statement
    };

    (events, orientation)
}

pub fn assemble_triggers(mut rows: Vec<TriggerRow>) -> Vec<Trigger> {
    rows.sort_by(|a, b| (&a.table, &a.name).cmp(&(&b.table, &b.name)));
    rows.into_iter()
        .map(|row| {
            let (events, orientation) = decode_trigger_type(row.tgtype);
            Trigger {
                trigger_name: row.name,
                table: row.table,
                function: row.function,
                events,
                orientation,
                // 'D' is the only disabled state; O/R/A fire depending on session replication role
                enabled: row.enabled_code != "D",
            }
        })
        .collect()
}

pub fn assemble_enums(rows: Vec<EnumLabelRow>) -> Vec<Enum> {
    let mut groups = group_by(rows, |r| (r.schema.clone(), r.name.clone()));
    groups.sort_by(|(ka, _), (kb, _)| (&ka.1, &ka.0).cmp(&(&kb.1, &kb.0)));

    groups
        .into_iter()
        .map(|((schema, name), mut labels)| {
            labels.sort_by(|a, b| a.sort_order.total_cmp(&b.sort_order));
            Enum {
                name,
                schema,
                values: labels.into_iter().map(|l| l.label).collect(),
            }
        })
        .collect()
}

/// Per table: secondary indexes by name, then the primary key index last
pub fn assemble_indexes(rows: Vec<IndexColumnRow>) -> Result<Vec<Index>> {
    let mut groups = group_by(rows, |r| (r.table.clone(), r.index_name.clone()));
    groups.sort_by(|a, b| {
        let (ta, ia) = &a.0;
        let (tb, ib) = &b.0;
        let pa = a.1[0].is_primary;
        let pb = b.1[0].is_primary;
        (ta, pa, ia).cmp(&(tb, pb, ib))
    });

    groups
        .into_iter()
        .map(|((table, index_name), mut keys)| {
            keys.sort_by_key(|k| k.position);

            let first = &keys[0];
            if keys
                .iter()
                .any(|k| k.is_unique != first.is_unique || k.definition != first.definition)
            {
                return Err(SnapshotError::shape(
                    Category::Indexes,
                    format!("inconsistent rows for index {}.{}", table, index_name),
                ));
            }

            let unique = first.is_unique || first.is_primary;
            let definition = first.definition.clone();

            Ok(Index {
                table,
                index_name,
                columns: keys.into_iter().map(|k| k.column).collect(),
                unique,
                definition,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn column(table: &str, name: &str, data_type: &str, ordinal: i16) -> ColumnRow {
        ColumnRow {
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            ordinal,
        }
    }

    fn constraint(table: &str, name: &str, kind: ConstraintKind, col: &str, def: &str) -> ConstraintColumnRow {
        ConstraintColumnRow {
            table: table.into(),
            constraint_name: name.into(),
            kind,
            column: col.into(),
            definition: def.into(),
        }
    }

    fn fk(table: &str, name: &str, col: &str, ref_table: &str, ref_col: &str, position: i64) -> ForeignKeyColumnRow {
        ForeignKeyColumnRow {
            table: table.into(),
            constraint_name: name.into(),
            column: col.into(),
            referred_table: ref_table.into(),
            referred_column: ref_col.into(),
            position,
        }
    }

    fn index_key(table: &str, name: &str, col: &str, position: i32, unique: bool, primary: bool) -> IndexColumnRow {
        IndexColumnRow {
            table: table.into(),
            index_name: name.into(),
            column: col.into(),
            position,
            is_unique: unique,
            is_primary: primary,
            definition: format!("CREATE INDEX {} ON public.{}", name, table),
        }
    }

    fn label(name: &str, value: &str, sort_order: f32) -> EnumLabelRow {
        EnumLabelRow {
            name: name.into(),
            schema: "public".into(),
            label: value.into(),
            sort_order,
        }
    }

    #[test]
    fn test_primary_key_and_unique_flags() {
        let columns = vec![
            column("users", "id", "integer", 1),
            column("users", "email", "character varying(255)", 2),
            column("users", "name", "text", 3),
        ];
        let constraints = vec![
            constraint("users", "users_pkey", ConstraintKind::PrimaryKey, "id", "PRIMARY KEY (id)"),
            constraint("users", "users_email_key", ConstraintKind::Unique, "email", "UNIQUE (email)"),
        ];

        let tables = assemble_tables(vec!["users".into()], columns, &constraints);
        let cols = &tables[0].columns;

        assert_eq!(tables[0].table_name, "users");
        assert!(cols[0].is_primary_key && cols[0].is_unique);
        assert!(!cols[1].is_primary_key && cols[1].is_unique);
        assert!(!cols[2].is_primary_key && !cols[2].is_unique);
        assert_eq!(cols[1].data_type, "VARCHAR(255)");
    }

    #[test]
    fn test_primary_key_flag_is_scoped_to_table() {
        let columns = vec![
            column("orders", "id", "integer", 1),
            column("users", "id", "integer", 1),
        ];
        let constraints = vec![constraint(
            "users",
            "users_pkey",
            ConstraintKind::PrimaryKey,
            "id",
            "PRIMARY KEY (id)",
        )];

        let tables = assemble_tables(vec!["orders".into(), "users".into()], columns, &constraints);

        assert!(!tables[0].columns[0].is_primary_key);
        assert!(tables[1].columns[0].is_primary_key);
    }

    #[test]
    fn test_columns_follow_ordinal_and_checks_attach() {
        let columns = vec![
            column("products", "price", "numeric(10,2)", 3),
            column("products", "id", "integer", 1),
            column("products", "sku", "text", 2),
        ];
        let constraints = vec![
            constraint("products", "price_positive", ConstraintKind::Check, "price", "CHECK ((price > (0)::numeric))"),
            constraint("products", "price_cap", ConstraintKind::Check, "price", "CHECK ((price < (10000)::numeric))"),
        ];

        let tables = assemble_tables(vec!["products".into()], columns, &constraints);
        let names: Vec<&str> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec!["id", "sku", "price"]);
        assert_eq!(tables[0].columns[2].check_constraints.len(), 2);
        assert!(tables[0].columns[0].check_constraints.is_empty());
    }

    #[test]
    fn test_table_without_columns_is_kept() {
        let tables = assemble_tables(vec!["empty".into()], vec![], &[]);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].columns.is_empty());
    }

    #[test]
    fn test_multi_column_foreign_key_pairs_by_position() {
        let rows = vec![
            fk("line_items", "line_items_order_fk", "order_version", "orders", "version", 2),
            fk("line_items", "line_items_order_fk", "order_id", "orders", "id", 1),
            fk("line_items", "line_items_product_fk", "product_id", "products", "id", 1),
        ];

        let keys = assemble_foreign_keys(rows).unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].constrained_columns, vec!["order_id", "order_version"]);
        assert_eq!(keys[0].referred_columns, vec!["id", "version"]);
        assert_eq!(keys[0].referred_table, "orders");
        assert_eq!(keys[1].referred_table, "products");
        for key in &keys {
            assert_eq!(key.constrained_columns.len(), key.referred_columns.len());
        }
    }

    #[test]
    fn test_foreign_key_with_mixed_targets_is_rejected() {
        let rows = vec![
            fk("a", "a_fk", "x", "b", "id", 1),
            fk("a", "a_fk", "y", "c", "id", 2),
        ];
        let err = assemble_foreign_keys(rows).unwrap_err();
        assert!(matches!(err, SnapshotError::UnexpectedShape { category: Category::ForeignKeys, .. }));
    }

    #[test]
    fn test_enum_values_keep_declaration_order() {
        let rows = vec![
            label("order_status", "completed", 3.0),
            label("order_status", "pending", 1.0),
            label("order_status", "cancelled", 4.0),
            label("order_status", "processing", 2.0),
        ];

        let enums = assemble_enums(rows);

        assert_eq!(enums.len(), 1);
        assert_eq!(enums[0].name, "order_status");
        assert_eq!(
            enums[0].values,
            vec!["pending", "processing", "completed", "cancelled"]
        );
    }

    #[test]
    fn test_enum_added_value_sorts_between() {
        // ALTER TYPE ... ADD VALUE 'paid' BEFORE 'shipped' gets a fractional sort order
        let rows = vec![
            label("state", "new", 1.0),
            label("state", "shipped", 2.0),
            label("state", "paid", 1.5),
        ];
        assert_eq!(assemble_enums(rows)[0].values, vec!["new", "paid", "shipped"]);
    }

    #[test]
    fn test_decode_trigger_type() {
        // AFTER INSERT OR UPDATE FOR EACH ROW
        let (events, orientation) = decode_trigger_type(TRIGGER_TYPE_ROW | TRIGGER_TYPE_INSERT | TRIGGER_TYPE_UPDATE);
        assert_eq!(events, vec!["AFTER INSERT", "AFTER UPDATE"]);
        assert_eq!(orientation, Orientation::Row);

        // BEFORE DELETE FOR EACH STATEMENT
        let (events, orientation) = decode_trigger_type(TRIGGER_TYPE_BEFORE | TRIGGER_TYPE_DELETE);
        assert_eq!(events, vec!["BEFORE DELETE"]);
        assert_eq!(orientation, Orientation::Statement);

        let (events, _) = decode_trigger_type(TRIGGER_TYPE_INSTEAD | TRIGGER_TYPE_ROW | TRIGGER_TYPE_INSERT);
        assert_eq!(events, vec!["INSTEAD OF INSERT"]);

        let (events, _) = decode_trigger_type(TRIGGER_TYPE_TRUNCATE);
        assert_eq!(events, vec!["AFTER TRUNCATE"]);
    }

    #[test]
    fn test_disabled_trigger() {
        let rows = vec![
            TriggerRow {
                name: "audit".into(),
                table: "users".into(),
                function: "log_change".into(),
                tgtype: 21,
                enabled_code: "D".into(),
            },
            TriggerRow {
                name: "touch".into(),
                table: "users".into(),
                function: "set_updated_at".into(),
                tgtype: 19,
                enabled_code: "O".into(),
            },
        ];
        let triggers = assemble_triggers(rows);

        assert!(!triggers[0].enabled);
        assert_eq!(triggers[0].events, vec!["AFTER INSERT", "AFTER UPDATE"]);
        assert!(triggers[1].enabled);
        assert_eq!(triggers[1].events, vec!["BEFORE UPDATE"]);
    }

    #[test]
    fn test_indexes_primary_key_last() {
        let rows = vec![
            index_key("users", "users_pkey", "id", 1, true, true),
            index_key("users", "idx_users_name", "last_name", 1, false, false),
            index_key("users", "idx_users_name", "first_name", 2, false, false),
            index_key("accounts", "accounts_pkey", "id", 1, true, true),
        ];

        let indexes = assemble_indexes(rows).unwrap();
        let order: Vec<(&str, &str)> = indexes
            .iter()
            .map(|i| (i.table.as_str(), i.index_name.as_str()))
            .collect();

        assert_eq!(
            order,
            vec![
                ("accounts", "accounts_pkey"),
                ("users", "idx_users_name"),
                ("users", "users_pkey"),
            ]
        );
        assert_eq!(indexes[1].columns, vec!["last_name", "first_name"]);
        assert!(!indexes[1].unique);
        assert!(indexes[2].unique);
    }

    #[test]
    fn test_functions_sorted_by_name() {
        let row = |name: &str| FunctionRow {
            name: name.into(),
            schema: "public".into(),
            arguments: "".into(),
            return_type: Some("trigger".into()),
            definition: format!("CREATE OR REPLACE FUNCTION public.{}()", name),
        };
        let functions = assemble_functions(vec![row("set_updated_at"), row("log_change")]);
        assert_eq!(functions[0].function_name, "log_change");
        assert_eq!(functions[1].function_name, "set_updated_at");
    }

    /// In-memory catalog for builder tests
    #[derive(Default)]
    struct StaticCatalog {
        tables: Vec<String>,
        columns: Vec<ColumnRow>,
        constraints: Vec<ConstraintColumnRow>,
        foreign_keys: Vec<ForeignKeyColumnRow>,
        indexes: Vec<IndexColumnRow>,
        fail_triggers: bool,
    }

    #[async_trait]
    impl CatalogSource for StaticCatalog {
        fn schema_name(&self) -> &str {
            "public"
        }

        async fn get_tables(&self) -> Result<Vec<String>> {
            Ok(self.tables.clone())
        }

        async fn get_columns(&self) -> Result<Vec<ColumnRow>> {
            Ok(self.columns.clone())
        }

        async fn get_constraint_columns(&self) -> Result<Vec<ConstraintColumnRow>> {
            Ok(self.constraints.clone())
        }

        async fn get_foreign_key_columns(&self) -> Result<Vec<ForeignKeyColumnRow>> {
            Ok(self.foreign_keys.clone())
        }

        async fn get_functions(&self) -> Result<Vec<FunctionRow>> {
            Ok(vec![])
        }

        async fn get_triggers(&self) -> Result<Vec<TriggerRow>> {
            if self.fail_triggers {
                return Err(SnapshotError::shape(Category::Triggers, "column 3: invalid type"));
            }
            Ok(vec![])
        }

        async fn get_enum_labels(&self) -> Result<Vec<EnumLabelRow>> {
            Ok(vec![])
        }

        async fn get_index_columns(&self) -> Result<Vec<IndexColumnRow>> {
            Ok(self.indexes.clone())
        }
    }

    fn shop() -> StaticCatalog {
        StaticCatalog {
            tables: vec!["customers".into(), "orders".into()],
            columns: vec![
                column("customers", "id", "integer", 1),
                column("orders", "id", "integer", 1),
                column("orders", "customer_id", "integer", 2),
            ],
            constraints: vec![
                constraint("customers", "customers_pkey", ConstraintKind::PrimaryKey, "id", "PRIMARY KEY (id)"),
                constraint("orders", "orders_pkey", ConstraintKind::PrimaryKey, "id", "PRIMARY KEY (id)"),
            ],
            foreign_keys: vec![fk("orders", "orders_customer_id_fkey", "customer_id", "customers", "id", 1)],
            indexes: vec![
                index_key("customers", "customers_pkey", "id", 1, true, true),
                index_key("orders", "orders_pkey", "id", 1, true, true),
            ],
            fail_triggers: false,
        }
    }

    #[tokio::test]
    async fn test_build_snapshot_empty_categories() {
        let snapshot = build_snapshot(&shop()).await.unwrap();

        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(snapshot.foreign_keys.len(), 1);
        assert_eq!(snapshot.indexes.len(), 2);
        assert!(snapshot.functions.is_empty());
        assert!(snapshot.triggers.is_empty());
        assert!(snapshot.enums.is_empty());

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["functions"], serde_json::json!([]));
        assert_eq!(value["enums"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_build_snapshot_is_stable() {
        let first = build_snapshot(&shop()).await.unwrap();
        let second = build_snapshot(&shop()).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_query_failure_aborts_build() {
        let catalog = StaticCatalog {
            fail_triggers: true,
            ..shop()
        };
        let err = build_snapshot(&catalog).await.unwrap_err();
        assert!(matches!(err, SnapshotError::UnexpectedShape { category: Category::Triggers, .. }));
    }
}
