//! PostgreSQL catalog source using tokio-postgres
//!
//! Queries `pg_catalog` directly rather than `information_schema` so that
//! ordinals, trigger bitmasks and enum sort orders come through untouched.

use crate::config::ConnectionConfig;
use crate::db::driver::CatalogSource;
use crate::db::schema::{
    ColumnRow, ConstraintColumnRow, ConstraintKind, EnumLabelRow, ForeignKeyColumnRow,
    FunctionRow, IndexColumnRow, TriggerRow,
};
use crate::error::{Category, Result, SnapshotError};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::FromSql;
use tokio_postgres::config::Host;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, warn};

const APPLICATION_NAME: &str = "pg_schema_snapshot";

const TABLES_QUERY: &str = r#"
SELECT c.relname::text
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1::text
  AND c.relkind IN ('r', 'p')
ORDER BY c.relname
"#;

const COLUMNS_QUERY: &str = r#"
SELECT c.relname::text,
       a.attname::text,
       format_type(a.atttypid, a.atttypmod),
       NOT a.attnotnull,
       CASE WHEN a.attgenerated = '' THEN pg_get_expr(d.adbin, d.adrelid) END,
       a.attnum
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1::text
  AND c.relkind IN ('r', 'p')
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY c.relname, a.attnum
"#;

const CONSTRAINT_COLUMNS_QUERY: &str = r#"
SELECT t.relname::text,
       con.conname::text,
       con.contype::text,
       a.attname::text,
       pg_get_constraintdef(con.oid)
FROM pg_constraint con
JOIN pg_class t ON t.oid = con.conrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
CROSS JOIN LATERAL unnest(con.conkey) AS k(attnum)
JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
WHERE n.nspname = $1::text
  AND con.contype IN ('p', 'u', 'c')
ORDER BY t.relname, con.conname
"#;

const FOREIGN_KEY_COLUMNS_QUERY: &str = r#"
SELECT t.relname::text,
       con.conname::text,
       a.attname::text,
       rt.relname::text,
       ra.attname::text,
       k.ord
FROM pg_constraint con
JOIN pg_class t ON t.oid = con.conrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
JOIN pg_class rt ON rt.oid = con.confrelid
CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refattnum, ord)
JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refattnum
WHERE n.nspname = $1::text
  AND con.contype = 'f'
  AND t.relkind IN ('r', 'p')
ORDER BY t.relname, con.conname, k.ord
"#;

// Aggregates and window functions are skipped: pg_get_functiondef rejects them.
const FUNCTIONS_QUERY: &str = r#"
SELECT p.proname::text,
       n.nspname::text,
       pg_get_function_arguments(p.oid),
       pg_get_function_result(p.oid),
       pg_get_functiondef(p.oid)
FROM pg_proc p
JOIN pg_namespace n ON n.oid = p.pronamespace
WHERE n.nspname = $1::text
  AND p.prokind IN ('f', 'p')
  AND p.proname NOT LIKE 'pg\_%'
  AND p.proname NOT LIKE 'supabase\_%'
  AND NOT EXISTS (
      SELECT 1 FROM pg_depend d
      WHERE d.classid = 'pg_proc'::regclass
        AND d.objid = p.oid
        AND d.deptype = 'e'
  )
ORDER BY p.proname, p.oid
"#;

const TRIGGERS_QUERY: &str = r#"
SELECT t.tgname::text,
       c.relname::text,
       p.proname::text,
       t.tgtype,
       t.tgenabled::text
FROM pg_trigger t
JOIN pg_class c ON c.oid = t.tgrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_proc p ON p.oid = t.tgfoid
WHERE NOT t.tgisinternal
  AND n.nspname = $1::text
  AND t.tgname NOT LIKE 'pg\_%'
  AND t.tgname NOT LIKE 'supabase\_%'
ORDER BY c.relname, t.tgname
"#;

const ENUM_LABELS_QUERY: &str = r#"
SELECT t.typname::text,
       n.nspname::text,
       e.enumlabel::text,
       e.enumsortorder
FROM pg_type t
JOIN pg_enum e ON e.enumtypid = t.oid
JOIN pg_namespace n ON n.oid = t.typnamespace
WHERE n.nspname = $1::text
ORDER BY t.typname, e.enumsortorder
"#;

// indnkeyatts leaves out INCLUDE columns. Plain keys use the bare attribute
// name; expression keys (indkey entry 0) fall back to the rendered expression.
const INDEX_COLUMNS_QUERY: &str = r#"
SELECT t.relname::text,
       ic.relname::text,
       COALESCE(a.attname::text, pg_get_indexdef(i.indexrelid, k.ord, true)),
       k.ord,
       i.indisunique,
       i.indisprimary,
       pg_get_indexdef(i.indexrelid)
FROM pg_index i
JOIN pg_class ic ON ic.oid = i.indexrelid
JOIN pg_class t ON t.oid = i.indrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
CROSS JOIN LATERAL generate_series(1, i.indnkeyatts::int) AS k(ord)
LEFT JOIN pg_attribute a
       ON a.attrelid = i.indrelid
      AND a.attnum = i.indkey[k.ord - 1]
      AND i.indkey[k.ord - 1] <> 0
WHERE n.nspname = $1::text
  AND t.relkind IN ('r', 'p')
ORDER BY t.relname, ic.relname, k.ord
"#;

/// A single read-only session against one PostgreSQL database
pub struct PostgresCatalog {
    client: Client,
    connection: JoinHandle<()>,
    schema: String,
}

impl PostgresCatalog {
    /// Open the connection. The session is forced read-only.
    pub async fn connect(cfg: &ConnectionConfig, schema: &str) -> Result<Self> {
        let mut config = Config::new();
        config
            .host(cfg.host.as_str())
            .port(cfg.port)
            .user(cfg.user.as_str())
            .password(cfg.password.as_str())
            .dbname(cfg.database.as_str());

        Self::connect_with_config(config, schema).await
    }

    /// Connect using a prepared [`tokio_postgres::Config`].
    ///
    /// Session options already set on `config` are replaced by the read-only
    /// setting.
    pub async fn connect_with_config(mut config: Config, schema: &str) -> Result<Self> {
        config
            .application_name(APPLICATION_NAME)
            .options("-c default_transaction_read_only=on");

        let (client, connection) =
            config
                .connect(NoTls)
                .await
                .map_err(|source| connection_error(&config, source))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "connection error");
            }
        });

        Ok(Self {
            client,
            connection,
            schema: schema.to_string(),
        })
    }

    /// Close the session and wait for the connection task to finish
    pub async fn close(self) {
        drop(self.client);
        if let Err(e) = self.connection.await {
            warn!(error = %e, "connection task did not shut down cleanly");
        }
    }

    async fn fetch(&self, category: Category, query: &str) -> Result<Vec<Row>> {
        debug!(%category, schema = %self.schema, "running catalog query");
        let rows = self
            .client
            .query(query, &[&self.schema])
            .await
            .map_err(SnapshotError::query(category))?;
        debug!(%category, rows = rows.len(), "catalog query finished");
        Ok(rows)
    }
}

fn connection_error(config: &Config, source: tokio_postgres::Error) -> SnapshotError {
    let host = match config.get_hosts().first() {
        Some(Host::Tcp(host)) => host.clone(),
        Some(other) => format!("{:?}", other),
        None => String::new(),
    };
    SnapshotError::Connection {
        host,
        port: config.get_ports().first().copied().unwrap_or(5432),
        database: config.get_dbname().unwrap_or_default().to_string(),
        source,
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, category: Category) -> Result<T> {
    row.try_get(idx)
        .map_err(|e| SnapshotError::shape(category, format!("column {}: {}", idx, e)))
}

fn column_row(row: &Row) -> Result<ColumnRow> {
    let cat = Category::Tables;
    Ok(ColumnRow {
        table: get(row, 0, cat)?,
        name: get(row, 1, cat)?,
        data_type: get(row, 2, cat)?,
        is_nullable: get(row, 3, cat)?,
        default: get(row, 4, cat)?,
        ordinal: get(row, 5, cat)?,
    })
}

fn constraint_column_row(row: &Row) -> Result<ConstraintColumnRow> {
    let cat = Category::Tables;
    let code: String = get(row, 2, cat)?;
    let kind = ConstraintKind::from_code(&code)
        .ok_or_else(|| SnapshotError::shape(cat, format!("unknown constraint type {:?}", code)))?;
    Ok(ConstraintColumnRow {
        table: get(row, 0, cat)?,
        constraint_name: get(row, 1, cat)?,
        kind,
        column: get(row, 3, cat)?,
        definition: get(row, 4, cat)?,
    })
}

fn foreign_key_column_row(row: &Row) -> Result<ForeignKeyColumnRow> {
    let cat = Category::ForeignKeys;
    Ok(ForeignKeyColumnRow {
        table: get(row, 0, cat)?,
        constraint_name: get(row, 1, cat)?,
        column: get(row, 2, cat)?,
        referred_table: get(row, 3, cat)?,
        referred_column: get(row, 4, cat)?,
        position: get(row, 5, cat)?,
    })
}

fn function_row(row: &Row) -> Result<FunctionRow> {
    let cat = Category::Functions;
    Ok(FunctionRow {
        name: get(row, 0, cat)?,
        schema: get(row, 1, cat)?,
        arguments: get(row, 2, cat)?,
        return_type: get(row, 3, cat)?,
        definition: get(row, 4, cat)?,
    })
}

fn trigger_row(row: &Row) -> Result<TriggerRow> {
    let cat = Category::Triggers;
    Ok(TriggerRow {
        name: get(row, 0, cat)?,
        table: get(row, 1, cat)?,
        function: get(row, 2, cat)?,
        tgtype: get(row, 3, cat)?,
        enabled_code: get(row, 4, cat)?,
    })
}

fn enum_label_row(row: &Row) -> Result<EnumLabelRow> {
    let cat = Category::Enums;
    Ok(EnumLabelRow {
        name: get(row, 0, cat)?,
        schema: get(row, 1, cat)?,
        label: get(row, 2, cat)?,
        sort_order: get(row, 3, cat)?,
    })
}

fn index_column_row(row: &Row) -> Result<IndexColumnRow> {
    let cat = Category::Indexes;
    Ok(IndexColumnRow {
        table: get(row, 0, cat)?,
        index_name: get(row, 1, cat)?,
        column: get(row, 2, cat)?,
        position: get(row, 3, cat)?,
        is_unique: get(row, 4, cat)?,
        is_primary: get(row, 5, cat)?,
        definition: get(row, 6, cat)?,
    })
}

#[async_trait]
impl CatalogSource for PostgresCatalog {
    fn schema_name(&self) -> &str {
        &self.schema
    }

    async fn get_tables(&self) -> Result<Vec<String>> {
        let rows = self.fetch(Category::Tables, TABLES_QUERY).await?;
        rows.iter().map(|row| get(row, 0, Category::Tables)).collect()
    }

    async fn get_columns(&self) -> Result<Vec<ColumnRow>> {
        let rows = self.fetch(Category::Tables, COLUMNS_QUERY).await?;
        rows.iter().map(column_row).collect()
    }

    async fn get_constraint_columns(&self) -> Result<Vec<ConstraintColumnRow>> {
        let rows = self.fetch(Category::Tables, CONSTRAINT_COLUMNS_QUERY).await?;
        rows.iter().map(constraint_column_row).collect()
    }

    async fn get_foreign_key_columns(&self) -> Result<Vec<ForeignKeyColumnRow>> {
        let rows = self.fetch(Category::ForeignKeys, FOREIGN_KEY_COLUMNS_QUERY).await?;
        rows.iter().map(foreign_key_column_row).collect()
    }

    async fn get_functions(&self) -> Result<Vec<FunctionRow>> {
        let rows = self.fetch(Category::Functions, FUNCTIONS_QUERY).await?;
        rows.iter().map(function_row).collect()
    }

    async fn get_triggers(&self) -> Result<Vec<TriggerRow>> {
        let rows = self.fetch(Category::Triggers, TRIGGERS_QUERY).await?;
        rows.iter().map(trigger_row).collect()
    }

    async fn get_enum_labels(&self) -> Result<Vec<EnumLabelRow>> {
        let rows = self.fetch(Category::Enums, ENUM_LABELS_QUERY).await?;
        rows.iter().map(enum_label_row).collect()
    }

    async fn get_index_columns(&self) -> Result<Vec<IndexColumnRow>> {
        let rows = self.fetch(Category::Indexes, INDEX_COLUMNS_QUERY).await?;
        rows.iter().map(index_column_row).collect()
    }
}
