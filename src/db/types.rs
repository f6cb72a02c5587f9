//! Type-name rendering for catalog columns

/// Render a `format_type()` string in compact upper-case form.
///
/// `character varying(100)` becomes `VARCHAR(100)`, `numeric(10,2)` becomes
/// `NUMERIC(10, 2)`, and `timestamp(3) with time zone` becomes
/// `TIMESTAMP(3) WITH TIME ZONE`. Array suffixes are kept. Anything that
/// isn't a built-in type (enums, domains, composite types) is returned
/// unchanged.
pub fn render_type(formatted: &str) -> String {
    let formatted = formatted.trim();

    let mut base = formatted;
    let mut dims = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped.trim_end();
        dims += 1;
    }

    let rendered = match render_base(base) {
        Some(name) => name,
        None => return formatted.to_string(),
    };

    let mut out = rendered;
    for _ in 0..dims {
        out.push_str("[]");
    }
    out
}

fn render_base(base: &str) -> Option<String> {
    // "timestamp(3) with time zone" carries its modifier mid-name
    let (name, modifier) = match (base.find('('), base.find(')')) {
        (Some(open), Some(close)) if open < close => {
            let name = format!("{} {}", &base[..open], &base[close + 1..]);
            (normalize(&name), Some(&base[open + 1..close]))
        }
        _ => (normalize(base), None),
    };

    let upper = match name.as_str() {
        "character varying" | "varchar" => "VARCHAR",
        "character" | "char" | "bpchar" => "CHAR",
        "\"char\"" => "CHAR",
        "integer" | "int" | "int4" => "INTEGER",
        "bigint" | "int8" => "BIGINT",
        "smallint" | "int2" => "SMALLINT",
        "numeric" | "decimal" => "NUMERIC",
        "real" | "float4" => "REAL",
        "double precision" | "float8" => "DOUBLE PRECISION",
        "boolean" | "bool" => "BOOLEAN",
        "text" => "TEXT",
        "uuid" => "UUID",
        "json" => "JSON",
        "jsonb" => "JSONB",
        "bytea" => "BYTEA",
        "date" => "DATE",
        "interval" => "INTERVAL",
        "timestamp without time zone" | "timestamp" => "TIMESTAMP",
        "timestamp with time zone" | "timestamptz" => "TIMESTAMP WITH TIME ZONE",
        "time without time zone" | "time" => "TIME",
        "time with time zone" | "timetz" => "TIME WITH TIME ZONE",
        "inet" => "INET",
        "cidr" => "CIDR",
        "macaddr" => "MACADDR",
        "money" => "MONEY",
        "xml" => "XML",
        "oid" => "OID",
        "bit" => "BIT",
        "bit varying" => "BIT VARYING",
        "tsvector" => "TSVECTOR",
        "tsquery" => "TSQUERY",
        "point" => "POINT",
        "int4range" => "INT4RANGE",
        "int8range" => "INT8RANGE",
        "numrange" => "NUMRANGE",
        "daterange" => "DATERANGE",
        "tsrange" => "TSRANGE",
        "tstzrange" => "TSTZRANGE",
        _ => return None,
    };

    // The modifier goes after the first word: TIMESTAMP(3) WITH TIME ZONE
    let (head, tail) = match upper.strip_suffix(" WITH TIME ZONE") {
        Some(head) => (head, " WITH TIME ZONE"),
        None => (upper, ""),
    };

    Some(match modifier {
        Some(args) => {
            let args: Vec<&str> = args.split(',').map(str::trim).collect();
            format!("{}({}){}", head, args.join(", "), tail)
        }
        None => upper.to_string(),
    })
}

fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}
