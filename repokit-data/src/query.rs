//! SQL rendering for a table plus a [`Criteria`].
//!
//! Every identifier is validated before it reaches the SQL text, since sort
//! columns can arrive straight from request parameters.
//!
//! ```ignore
//! let criteria = Criteria::new()
//!     .where_eq("email", "a@b.com")
//!     .order_by("id", SortDirection::Asc)
//!     .limit(10);
//! let (sql, params) = QueryBuilder::new("users")
//!     .dialect(Dialect::Postgres)
//!     .criteria(&criteria)
//!     .build_select(&["*"])?;
//! ```

use serde_json::Value;

use crate::criteria::{Condition, Criteria};
use crate::entity::Record;

/// Alias under which grouped counts are returned.
pub const COUNT_ALIAS: &str = "count";

#[derive(Debug, Clone, Copy)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    /// `LIMIT` clause to pair with a bare `OFFSET`.
    fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => None,
            Dialect::MySql => Some("18446744073709551615"),
            Dialect::Generic | Dialect::Sqlite => Some("-1"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum IdentifierPolicy {
    /// Validate identifiers against a conservative pattern.
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    criteria: Criteria,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
}

/// Accumulates bind values and hands out placeholders in order.
struct Binds {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Binds {
    fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            criteria: Criteria::new(),
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Validate,
        }
    }

    /// Set the SQL dialect (affects placeholder style and quoting).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configure identifier quoting behavior.
    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    /// Use `criteria` for the WHERE, ORDER BY and LIMIT/OFFSET clauses.
    pub fn criteria(mut self, criteria: &Criteria) -> Self {
        self.criteria = criteria.clone();
        self
    }

    /// Build a SELECT query returning `(sql, bind_values)`.
    pub fn build_select(&self, columns: &[&str]) -> Result<(String, Vec<Value>), QueryError> {
        let columns = self.column_list(columns, true)?;
        let mut sql = format!("SELECT {columns} FROM {}", self.table()?);
        let mut binds = self.binds();
        self.append_where(&mut sql, &mut binds)?;
        self.append_order(&mut sql)?;
        self.append_limit_offset(&mut sql);
        Ok((sql, binds.values))
    }

    /// Build a COUNT query. `None` (or `*`) counts rows, a column counts its non-null values.
    pub fn build_count(&self, column: Option<&str>) -> Result<(String, Vec<Value>), QueryError> {
        let target = match column {
            None | Some("*") => "*".to_string(),
            Some(col) => self.identifier(col, false, "column")?,
        };
        let mut sql = format!("SELECT COUNT({target}) FROM {}", self.table()?);
        let mut binds = self.binds();
        self.append_where(&mut sql, &mut binds)?;
        Ok((sql, binds.values))
    }

    /// Build a SUM query over `column`.
    pub fn build_sum(&self, column: &str) -> Result<(String, Vec<Value>), QueryError> {
        let column = self.identifier(column, false, "column")?;
        let mut sql = format!("SELECT SUM({column}) FROM {}", self.table()?);
        let mut binds = self.binds();
        self.append_where(&mut sql, &mut binds)?;
        Ok((sql, binds.values))
    }

    /// Build a grouped COUNT, ordered by count descending then by the group
    /// columns ascending.
    pub fn build_count_group_by(
        &self,
        select: &[&str],
        group: &[&str],
    ) -> Result<(String, Vec<Value>), QueryError> {
        if group.is_empty() {
            return Err(QueryError::EmptyColumnList("GROUP BY"));
        }
        let alias = self.identifier(COUNT_ALIAS, false, "alias")?;
        let mut projection = Vec::with_capacity(select.len() + 1);
        for col in select {
            projection.push(self.identifier(col, false, "column")?);
        }
        projection.push(format!("COUNT(*) AS {alias}"));
        let group = self.column_list(group, false)?;

        let mut sql = format!("SELECT {} FROM {}", projection.join(", "), self.table()?);
        let mut binds = self.binds();
        self.append_where(&mut sql, &mut binds)?;
        let tie_break: Vec<String> = group.split(", ").map(|c| format!("{c} ASC")).collect();
        sql.push_str(&format!(
            " GROUP BY {group} ORDER BY {alias} DESC, {}",
            tie_break.join(", ")
        ));
        Ok((sql, binds.values))
    }

    /// Build an INSERT for the record's fields.
    pub fn build_insert(&self, record: &Record) -> Result<(String, Vec<Value>), QueryError> {
        let table = self.table()?;
        if record.is_empty() {
            return Ok((format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new()));
        }
        let mut columns = Vec::with_capacity(record.len());
        let mut binds = self.binds();
        let mut placeholders = Vec::with_capacity(record.len());
        for (column, value) in record {
            columns.push(self.identifier(column, false, "column")?);
            placeholders.push(binds.push(value.clone()));
        }
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok((sql, binds.values))
    }

    /// Build an UPDATE setting the record's fields on every matched row.
    pub fn build_update(&self, changes: &Record) -> Result<(String, Vec<Value>), QueryError> {
        if changes.is_empty() {
            return Err(QueryError::EmptyColumnList("SET"));
        }
        let mut binds = self.binds();
        let mut assignments = Vec::with_capacity(changes.len());
        for (column, value) in changes {
            let column = self.identifier(column, false, "column")?;
            let placeholder = binds.push(value.clone());
            assignments.push(format!("{column} = {placeholder}"));
        }
        let mut sql = format!("UPDATE {} SET {}", self.table()?, assignments.join(", "));
        self.append_where(&mut sql, &mut binds)?;
        Ok((sql, binds.values))
    }

    /// Build a DELETE for every matched row. Ordering and paging are ignored.
    pub fn build_delete(&self) -> Result<(String, Vec<Value>), QueryError> {
        let mut sql = format!("DELETE FROM {}", self.table()?);
        let mut binds = self.binds();
        self.append_where(&mut sql, &mut binds)?;
        Ok((sql, binds.values))
    }

    fn binds(&self) -> Binds {
        Binds {
            dialect: self.dialect,
            values: Vec::new(),
        }
    }

    fn table(&self) -> Result<String, QueryError> {
        self.identifier(&self.table, false, "table")
    }

    fn append_where(&self, sql: &mut String, binds: &mut Binds) -> Result<(), QueryError> {
        let conditions = self.criteria.conditions();
        if conditions.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(conditions.len());
        for cond in conditions {
            let col = self.identifier(cond.column(), false, "column")?;
            let clause = match cond {
                Condition::Eq(_, Value::Null) => format!("{col} IS NULL"),
                Condition::NotEq(_, Value::Null) => format!("{col} IS NOT NULL"),
                Condition::Eq(_, v) => format!("{col} = {}", binds.push(v.clone())),
                Condition::NotEq(_, v) => format!("{col} != {}", binds.push(v.clone())),
                Condition::Like(_, p) => format!("{col} LIKE {}", binds.push(Value::from(p.as_str()))),
                Condition::Gt(_, v) => format!("{col} > {}", binds.push(v.clone())),
                Condition::Gte(_, v) => format!("{col} >= {}", binds.push(v.clone())),
                Condition::Lt(_, v) => format!("{col} < {}", binds.push(v.clone())),
                Condition::Lte(_, v) => format!("{col} <= {}", binds.push(v.clone())),
                Condition::In(_, vals) if vals.is_empty() => "1 = 0".to_string(),
                Condition::NotIn(_, vals) if vals.is_empty() => "1 = 1".to_string(),
                Condition::In(_, vals) => {
                    let placeholders: Vec<_> = vals.iter().map(|v| binds.push(v.clone())).collect();
                    format!("{col} IN ({})", placeholders.join(", "))
                }
                Condition::NotIn(_, vals) => {
                    let placeholders: Vec<_> = vals.iter().map(|v| binds.push(v.clone())).collect();
                    format!("{col} NOT IN ({})", placeholders.join(", "))
                }
                Condition::IsNull(_) => format!("{col} IS NULL"),
                Condition::IsNotNull(_) => format!("{col} IS NOT NULL"),
            };
            clauses.push(clause);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
        Ok(())
    }

    fn append_order(&self, sql: &mut String) -> Result<(), QueryError> {
        let order = self.criteria.order();
        if order.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(order.len());
        for (col, direction) in order {
            let col = self.identifier(col, false, "column")?;
            clauses.push(format!("{col} {}", direction.sql()));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn append_limit_offset(&self, sql: &mut String) {
        match (self.criteria.limit_value(), self.criteria.offset_value()) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_)) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    sql.push_str(&format!(" LIMIT {unbounded}"));
                }
            }
            (None, None) => {}
        }
        if let Some(offset) = self.criteria.offset_value() {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn column_list(&self, columns: &[&str], allow_star: bool) -> Result<String, QueryError> {
        if columns.is_empty() {
            return Err(QueryError::EmptyColumnList("SELECT"));
        }
        let mut out = Vec::with_capacity(columns.len());
        for col in columns {
            out.push(self.identifier(col, allow_star, "column")?);
        }
        Ok(out.join(", "))
    }

    fn identifier(
        &self,
        ident: &str,
        allow_star: bool,
        kind: &'static str,
    ) -> Result<String, QueryError> {
        if !is_valid_identifier(ident, allow_star) {
            return Err(QueryError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect, allow_star)),
            IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
    EmptyColumnList(&'static str),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            QueryError::EmptyColumnList(clause) => write!(f, "Empty column list for {clause}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// `segment(.segment)*` where a segment is `[A-Za-z_][A-Za-z0-9_]*`; with
/// `allow_star`, the last segment may be `*`.
pub fn is_valid_identifier(ident: &str, allow_star: bool) -> bool {
    if ident.is_empty() {
        return false;
    }
    let parts: Vec<&str> = ident.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if allow_star && *part == "*" {
            return idx + 1 == parts.len();
        }
        if !is_valid_segment(part) {
            return false;
        }
    }
    true
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(ident: &str, dialect: Dialect, allow_star: bool) -> String {
    let quote = dialect.quote_char();
    let parts: Vec<&str> = ident.split('.').collect();
    let last_idx = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, part)| {
            if allow_star && part == "*" && idx == last_idx {
                part.to_string()
            } else {
                format!("{quote}{part}{quote}")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::SortDirection;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_simple_select() {
        let (sql, params) = QueryBuilder::new("users").build_select(&["*"]).unwrap();
        assert_eq!(sql, "SELECT * FROM users");
        assert!(params.is_empty());
    }

    #[test]
    fn test_complex_select() {
        let criteria = Criteria::new()
            .where_eq("status", "active")
            .where_like("name", "%alice%")
            .order_by("id", SortDirection::Asc)
            .limit(10)
            .offset(20);
        let (sql, params) = QueryBuilder::new("users")
            .criteria(&criteria)
            .build_select(&["id", "name"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE status = ? AND name LIKE ? ORDER BY id ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![json!("active"), json!("%alice%")]);
    }

    #[test]
    fn test_bare_offset_gets_unbounded_limit() {
        let criteria = Criteria::new().offset(5);
        let (sql, _) = QueryBuilder::new("users")
            .dialect(Dialect::Sqlite)
            .criteria(&criteria)
            .build_select(&["*"])
            .unwrap();
        assert_eq!(sql, "SELECT * FROM users LIMIT -1 OFFSET 5");

        let (sql, _) = QueryBuilder::new("users")
            .dialect(Dialect::Postgres)
            .criteria(&criteria)
            .build_select(&["*"])
            .unwrap();
        assert_eq!(sql, "SELECT * FROM users OFFSET 5");
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let criteria = Criteria::new()
            .where_eq("deleted_at", Value::Null)
            .where_not_eq("archived_at", Value::Null);
        let (sql, params) = QueryBuilder::new("users")
            .criteria(&criteria)
            .build_count(None)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL AND archived_at IS NOT NULL"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_postgres_placeholders() {
        let criteria = Criteria::new()
            .where_eq("status", "active")
            .where_in("role", ["admin", "user"])
            .where_gte("age", 18);
        let (sql, params) = QueryBuilder::new("users")
            .dialect(Dialect::Postgres)
            .criteria(&criteria)
            .build_select(&["*"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE status = $1 AND role IN ($2, $3) AND age >= $4"
        );
        assert_eq!(params, vec![json!("active"), json!("admin"), json!("user"), json!(18)]);
    }

    #[test]
    fn test_empty_in_list() {
        let criteria = Criteria::new()
            .where_in("id", Vec::<i64>::new())
            .where_not_in("id", Vec::<i64>::new());
        let (sql, _) = QueryBuilder::new("users").criteria(&criteria).build_delete().unwrap();
        assert_eq!(sql, "DELETE FROM users WHERE 1 = 0 AND 1 = 1");
    }

    #[test]
    fn test_count_column_and_sum() {
        let criteria = Criteria::new().where_gt("total", 0);
        let builder = QueryBuilder::new("orders").criteria(&criteria);
        let (sql, _) = builder.build_count(Some("shipped_at")).unwrap();
        assert_eq!(sql, "SELECT COUNT(shipped_at) FROM orders WHERE total > ?");
        let (sql, params) = builder.build_sum("total").unwrap();
        assert_eq!(sql, "SELECT SUM(total) FROM orders WHERE total > ?");
        assert_eq!(params, vec![json!(0)]);
    }

    #[test]
    fn test_count_group_by() {
        let criteria = Criteria::new().where_eq("active", true);
        let (sql, params) = QueryBuilder::new("users")
            .dialect(Dialect::Sqlite)
            .identifier_policy(IdentifierPolicy::Quote)
            .criteria(&criteria)
            .build_count_group_by(&["country", "city"], &["country", "city"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"country\", \"city\", COUNT(*) AS \"count\" FROM \"users\" WHERE \"active\" = ? \
             GROUP BY \"country\", \"city\" ORDER BY \"count\" DESC, \"country\" ASC, \"city\" ASC"
        );
        assert_eq!(params, vec![json!(true)]);
    }

    #[test]
    fn test_insert_and_update() {
        let builder = QueryBuilder::new("users").dialect(Dialect::Postgres);
        let (sql, params) = builder
            .build_insert(&record(json!({"email": "a@b.com", "name": "A"})))
            .unwrap();
        assert_eq!(sql, "INSERT INTO users (email, name) VALUES ($1, $2)");
        assert_eq!(params, vec![json!("a@b.com"), json!("A")]);

        let criteria = Criteria::new().where_eq("id", 7);
        let (sql, params) = builder
            .criteria(&criteria)
            .build_update(&record(json!({"name": "B"})))
            .unwrap();
        assert_eq!(sql, "UPDATE users SET name = $1 WHERE id = $2");
        assert_eq!(params, vec![json!("B"), json!(7)]);
    }

    #[test]
    fn test_empty_insert_uses_default_values() {
        let (sql, params) = QueryBuilder::new("counters").build_insert(&Record::new()).unwrap();
        assert_eq!(sql, "INSERT INTO counters DEFAULT VALUES");
        assert!(params.is_empty());
        assert_eq!(
            QueryBuilder::new("counters").build_update(&Record::new()),
            Err(QueryError::EmptyColumnList("SET"))
        );
    }

    #[test]
    fn test_quoting() {
        let criteria = Criteria::new()
            .where_eq("users.email", "a@b.com")
            .order_by("users.id", SortDirection::Desc);
        let (sql, _) = QueryBuilder::new("users")
            .dialect(Dialect::MySql)
            .identifier_policy(IdentifierPolicy::Quote)
            .criteria(&criteria)
            .build_select(&["users.*"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `users`.* FROM `users` WHERE `users`.`email` = ? ORDER BY `users`.`id` DESC"
        );
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        let err = QueryBuilder::new("users;drop").build_select(&["*"]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { kind: "table", .. }));

        let criteria = Criteria::new().order_by("id; DROP TABLE users", SortDirection::Asc);
        let err = QueryBuilder::new("users")
            .criteria(&criteria)
            .build_select(&["*"])
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { kind: "column", .. }));
    }
}
