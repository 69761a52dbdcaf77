//! SQL text shared by the SQLite and Postgres backends.
//!
//! Both backends run the same statements; only placeholders and JSON access
//! differ, and [`Dialect`] covers those. Builders push parameters in the
//! order their placeholders appear so positional `?` binding stays correct.

use chainstream_core::boundary::StreamBoundary;
use chainstream_core::filters::{AddressFilters, LabelFilters};
use chainstream_core::provider::Order;

use crate::chain::Blockchain;
use crate::store::TableQuery;

/// SQL flavour of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// `label_data.name` as text.
    fn json_name(&self, column: &str) -> String {
        match self {
            Self::Sqlite => format!("json_extract({column}, '$.name')"),
            Self::Postgres => format!("{column}->>'name'"),
        }
    }

    /// The whole JSON column as text.
    fn json_text(&self, column: &str) -> String {
        match self {
            Self::Sqlite => column.to_string(),
            Self::Postgres => format!("{column}::text"),
        }
    }

    fn json_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "TEXT",
            Self::Postgres => "JSONB",
        }
    }

    fn int_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER",
            Self::Postgres => "BIGINT",
        }
    }
}

/// A bound parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
}

/// Statement text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Param>,
}

struct Builder {
    dialect: Dialect,
    params: Vec<Param>,
}

impl Builder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn param(&mut self, value: Param) -> String {
        self.params.push(value);
        match self.dialect {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", self.params.len()),
        }
    }

    /// `column >= start AND column < end`, honouring inclusivity.
    fn window(&mut self, column: &str, boundary: &StreamBoundary) -> String {
        let op = if boundary.include_start { ">=" } else { ">" };
        let start = self.param(Param::Int(boundary.start_time));
        let mut clause = format!("{column} {op} {start}");
        if let Some(end_time) = boundary.end_time {
            let op = if boundary.include_end { "<=" } else { "<" };
            let end = self.param(Param::Int(end_time));
            clause.push_str(&format!(" AND {column} {op} {end}"));
        }
        clause
    }

    /// Case-insensitive `lower(column) IN (...)`.
    fn in_addresses(&mut self, column: &str, values: &[String]) -> String {
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| self.param(Param::Text(v.to_lowercase())))
            .collect();
        format!("lower({column}) IN ({})", placeholders.join(", "))
    }

    fn in_values(&mut self, expr: &str, values: &[String]) -> String {
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| self.param(Param::Text(v.clone())))
            .collect();
        format!("{expr} IN ({})", placeholders.join(", "))
    }

    fn order_and_limit(&mut self, column: &str, order: Order, limit: Option<u64>) -> String {
        let direction = match order {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        };
        let mut tail = format!(" ORDER BY {column} {direction}");
        if let Some(limit) = limit {
            let limit = self.param(Param::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
            tail.push_str(&format!(" LIMIT {limit}"));
        }
        tail
    }

    fn finish(self, sql: String) -> SqlQuery {
        SqlQuery {
            sql,
            params: self.params,
        }
    }
}

// ─── Queries ──────────────────────────────────────────────────────────────────

/// Transactions query, or `None` when every disjunct is empty.
pub fn transactions_query(dialect: Dialect, query: &TableQuery<'_, AddressFilters>) -> Option<SqlQuery> {
    let filters = query.filters;
    let has_labels = !filters.labels.is_empty() && !filters.subscribed.is_empty();
    if filters.from_addresses.is_empty() && filters.to_addresses.is_empty() && !has_labels {
        return None;
    }

    let mut b = Builder::new(dialect);
    let window = b.window("t.timestamp", query.boundary);

    let mut disjuncts = Vec::new();
    if !filters.from_addresses.is_empty() {
        disjuncts.push(b.in_addresses("t.from_address", &filters.from_addresses));
    }
    if !filters.to_addresses.is_empty() {
        disjuncts.push(b.in_addresses("t.to_address", &filters.to_addresses));
    }
    if has_labels {
        let labels = b.in_values("l.label", &filters.labels);
        let owners = b.in_addresses("l.address", &filters.subscribed);
        disjuncts.push(format!(
            "EXISTS (SELECT 1 FROM {} l WHERE l.transaction_hash = t.hash AND {labels} AND {owners})",
            query.chain.labels_table()
        ));
    }
    let tail = b.order_and_limit("t.timestamp", query.order, query.limit);

    let sql = format!(
        "SELECT t.hash, t.block_number, t.from_address, t.to_address, t.gas, t.gas_price, \
         t.input, t.nonce, t.value, t.timestamp \
         FROM {} t WHERE {window} AND ({}){tail}",
        query.chain.transactions_table(),
        disjuncts.join(" OR "),
    );
    Some(b.finish(sql))
}

/// Labels query, or `None` when no address or no label value is given.
pub fn labels_query(dialect: Dialect, query: &TableQuery<'_, LabelFilters>) -> Option<SqlQuery> {
    let filters = query.filters;
    if filters.addresses.is_empty() || filters.labels.is_empty() {
        return None;
    }

    let mut b = Builder::new(dialect);
    let mut clauses = vec![
        b.window("block_timestamp", query.boundary),
        b.in_addresses("address", &filters.addresses),
        b.in_values("label", &filters.labels),
    ];
    if !filters.names.is_empty() {
        clauses.push(b.in_values(&dialect.json_name("label_data"), &filters.names));
    }
    let tail = b.order_and_limit("block_timestamp", query.order, query.limit);

    let sql = format!(
        "SELECT label, address, transaction_hash, {} AS label_data, block_timestamp, log_index \
         FROM {} WHERE {}{tail}",
        dialect.json_text("label_data"),
        query.chain.labels_table(),
        clauses.join(" AND "),
    );
    Some(b.finish(sql))
}

// ─── Schema ───────────────────────────────────────────────────────────────────

/// `CREATE TABLE` / `CREATE INDEX` statements for one chain.
pub fn schema_statements(dialect: Dialect, chain: Blockchain) -> Vec<String> {
    let int = dialect.int_type();
    let json = dialect.json_type();
    let txs = chain.transactions_table();
    let labels = chain.labels_table();
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {txs} (
                hash         TEXT PRIMARY KEY,
                block_number {int} NOT NULL,
                from_address TEXT NOT NULL,
                to_address   TEXT,
                gas          TEXT NOT NULL,
                gas_price    TEXT NOT NULL,
                input        TEXT NOT NULL,
                nonce        {int} NOT NULL,
                value        TEXT NOT NULL,
                timestamp    {int} NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{txs}_timestamp ON {txs} (timestamp)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {labels} (
                label            TEXT NOT NULL,
                address          TEXT NOT NULL,
                transaction_hash TEXT,
                label_data       {json} NOT NULL,
                block_timestamp  {int} NOT NULL,
                log_index        {int}
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{labels}_address ON {labels} (address, label)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{labels}_timestamp ON {labels} (block_timestamp)"),
    ]
}

/// Insert statement for one transaction row.
pub fn insert_transaction_sql(dialect: Dialect, chain: Blockchain) -> String {
    let values = placeholders(dialect, 10);
    format!(
        "INSERT INTO {} (hash, block_number, from_address, to_address, gas, gas_price, input, nonce, value, timestamp) \
         VALUES ({values})",
        chain.transactions_table()
    )
}

/// Insert statement for one label row.
pub fn insert_label_sql(dialect: Dialect, chain: Blockchain) -> String {
    let mut values = placeholders(dialect, 6);
    if dialect == Dialect::Postgres {
        values = values.replace("$4", "$4::jsonb");
    }
    format!(
        "INSERT INTO {} (label, address, transaction_hash, label_data, block_timestamp, log_index) \
         VALUES ({values})",
        chain.labels_table()
    )
}

fn placeholders(dialect: Dialect, n: usize) -> String {
    (1..=n)
        .map(|i| match dialect {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${i}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
