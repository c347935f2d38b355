//! Generic row writers shared by every table.
//!
//! `insert`, `insert_returning`, `update` and `delete` build a parameterized
//! statement from column/value pairs and run it on any Postgres executor:
//! pass `&PgPool` to borrow one pooled connection for the single statement, or
//! `&mut *tx` to run inside a transaction the caller owns and finishes.
//!
//! The writers never return errors. A failed statement is logged and reported
//! as [`WriteOutcome::Failed`], which is distinct from a statement that ran and
//! touched no rows (`Applied(0)`). Callers decide what a failure means.

use sqlx::{
    postgres::PgArguments, query::Query, types::Json, Decode, Executor, Postgres, Row, Type,
};

/// A value bound into a generated statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i32),
    Text(String),
    Bool(bool),
    Json(serde_json::Value),
    /// The server clock. Rendered inline as `NOW()`, never bound.
    Now,
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

/// Column name paired with the value written to (or compared against) it.
pub type Column<'a> = (&'a str, SqlValue);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The statement ran. Carries the row count or returned column.
    Applied(T),
    /// The statement was rejected or the database reported an error.
    Failed,
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            WriteOutcome::Applied(v) => Some(v),
            WriteOutcome::Failed => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            WriteOutcome::Applied(v) => WriteOutcome::Applied(f(v)),
            WriteOutcome::Failed => WriteOutcome::Failed,
        }
    }
}

impl WriteOutcome<u64> {
    /// True when the statement ran and touched at least one row.
    pub fn affected_any(&self) -> bool {
        matches!(self, WriteOutcome::Applied(n) if *n > 0)
    }
}

impl WriteOutcome<bool> {
    /// True when the statement ran and inserted exactly one row.
    pub fn inserted(&self) -> bool {
        matches!(self, WriteOutcome::Applied(true))
    }
}

/// Insert one row; `Applied(true)` when exactly one row went in.
pub async fn insert<'c, E>(executor: E, table: &str, values: &[Column<'_>]) -> WriteOutcome<bool>
where
    E: Executor<'c, Database = Postgres>,
{
    let Some(sql) = insert_sql(table, values, None) else {
        tracing::error!(table, "refusing to build insert statement");
        return WriteOutcome::Failed;
    };

    let query = bind_values(sqlx::query(&sql), values.iter().map(|(_, v)| v));
    match query.execute(executor).await {
        Ok(result) => WriteOutcome::Applied(result.rows_affected() == 1),
        Err(e) => {
            tracing::error!(table, "insert failed: {e}");
            WriteOutcome::Failed
        }
    }
}

/// Insert one row and read `column` back from it.
pub async fn insert_returning<'c, E, T>(
    executor: E,
    table: &str,
    values: &[Column<'_>],
    column: &str,
) -> WriteOutcome<T>
where
    E: Executor<'c, Database = Postgres>,
    T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    let Some(sql) = insert_sql(table, values, Some(column)) else {
        tracing::error!(table, column, "refusing to build insert statement");
        return WriteOutcome::Failed;
    };

    let query = bind_values(sqlx::query(&sql), values.iter().map(|(_, v)| v));
    let row = match query.fetch_optional(executor).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::error!(table, "insert returned no row");
            return WriteOutcome::Failed;
        }
        Err(e) => {
            tracing::error!(table, "insert failed: {e}");
            return WriteOutcome::Failed;
        }
    };

    match row.try_get::<T, _>(column) {
        Ok(v) => WriteOutcome::Applied(v),
        Err(e) => {
            tracing::error!(table, column, "could not read returned column: {e}");
            WriteOutcome::Failed
        }
    }
}

/// Update every row matching all of `filter`; returns the updated row count.
pub async fn update<'c, E>(
    executor: E,
    table: &str,
    values: &[Column<'_>],
    filter: &[Column<'_>],
) -> WriteOutcome<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    let Some(sql) = update_sql(table, values, filter) else {
        tracing::error!(table, "refusing to build update statement");
        return WriteOutcome::Failed;
    };

    let query = bind_values(
        sqlx::query(&sql),
        values.iter().chain(filter).map(|(_, v)| v),
    );
    match query.execute(executor).await {
        Ok(result) => WriteOutcome::Applied(result.rows_affected()),
        Err(e) => {
            tracing::error!(table, "update failed: {e}");
            WriteOutcome::Failed
        }
    }
}

/// Delete every row matching all of `filter`; returns the deleted row count.
pub async fn delete<'c, E>(executor: E, table: &str, filter: &[Column<'_>]) -> WriteOutcome<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    let Some(sql) = delete_sql(table, filter) else {
        tracing::error!(table, "refusing to build delete statement");
        return WriteOutcome::Failed;
    };

    let query = bind_values(sqlx::query(&sql), filter.iter().map(|(_, v)| v));
    match query.execute(executor).await {
        Ok(result) => WriteOutcome::Applied(result.rows_affected()),
        Err(e) => {
            tracing::error!(table, "delete failed: {e}");
            WriteOutcome::Failed
        }
    }
}

/// `INSERT INTO t (a, b) VALUES ($1, $2) [RETURNING c]`, or `None` when a name
/// is not a plain identifier or there is nothing to insert.
pub fn insert_sql(table: &str, values: &[Column<'_>], returning: Option<&str>) -> Option<String> {
    if values.is_empty() || !is_identifier(table) || !all_identifiers(values) {
        return None;
    }
    if returning.is_some_and(|c| !is_identifier(c)) {
        return None;
    }

    let mut next = 1;
    let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
    let placeholders: Vec<String> = values.iter().map(|(_, v)| placeholder(v, &mut next)).collect();

    let mut sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );
    if let Some(column) = returning {
        sql.push_str(" RETURNING ");
        sql.push_str(column);
    }
    Some(sql)
}

/// `UPDATE t SET a = $1 WHERE b = $2 AND c = $3`.
pub fn update_sql(table: &str, values: &[Column<'_>], filter: &[Column<'_>]) -> Option<String> {
    if values.is_empty() || filter.is_empty() || !is_identifier(table) {
        return None;
    }
    if !all_identifiers(values) || !all_identifiers(filter) {
        return None;
    }

    let mut next = 1;
    let assignments = equalities(values, &mut next).join(", ");
    let conditions = equalities(filter, &mut next).join(" AND ");
    Some(format!("UPDATE {table} SET {assignments} WHERE {conditions}"))
}

/// `DELETE FROM t WHERE a = $1 AND b = $2`.
pub fn delete_sql(table: &str, filter: &[Column<'_>]) -> Option<String> {
    if filter.is_empty() || !is_identifier(table) || !all_identifiers(filter) {
        return None;
    }

    let mut next = 1;
    let conditions = equalities(filter, &mut next).join(" AND ");
    Some(format!("DELETE FROM {table} WHERE {conditions}"))
}

/// Table and column names are spliced into SQL, so only plain identifiers pass.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn all_identifiers(columns: &[Column<'_>]) -> bool {
    columns.iter().all(|(c, _)| is_identifier(c))
}

fn placeholder(value: &SqlValue, next: &mut usize) -> String {
    match value {
        SqlValue::Now => "NOW()".to_string(),
        _ => {
            let p = format!("${next}");
            *next += 1;
            p
        }
    }
}

fn equalities(columns: &[Column<'_>], next: &mut usize) -> Vec<String> {
    columns
        .iter()
        .map(|(c, v)| format!("{c} = {}", placeholder(v, next)))
        .collect()
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: impl Iterator<Item = &'q SqlValue>,
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(Json(v)),
            SqlValue::Now => query,
        };
    }
    query
}
