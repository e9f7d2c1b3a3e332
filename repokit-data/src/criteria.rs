use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse `asc` / `desc`, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub(crate) fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Equality; a `null` value means `IS NULL`.
    Eq(String, Value),
    /// Inequality; a `null` value means `IS NOT NULL`.
    NotEq(String, Value),
    Like(String, String),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _)
            | Condition::NotEq(c, _)
            | Condition::Like(c, _)
            | Condition::Gt(c, _)
            | Condition::Gte(c, _)
            | Condition::Lt(c, _)
            | Condition::Lte(c, _)
            | Condition::In(c, _)
            | Condition::NotIn(c, _)
            | Condition::IsNull(c)
            | Condition::IsNotNull(c) => c,
        }
    }

    /// Evaluate against a record with SQL semantics: comparisons involving
    /// a missing or null field are false.
    pub fn matches(&self, record: &Record) -> bool {
        let field = record.get(self.column()).filter(|v| !v.is_null());
        match (self, field) {
            (Condition::IsNull(_), f) => f.is_none(),
            (Condition::IsNotNull(_), f) => f.is_some(),
            (Condition::Eq(_, Value::Null), f) => f.is_none(),
            (Condition::NotEq(_, Value::Null), f) => f.is_some(),
            (_, None) => false,
            (Condition::Eq(_, v), Some(f)) => compare_values(f, v) == Some(Ordering::Equal),
            (Condition::NotEq(_, v), Some(f)) => compare_values(f, v) != Some(Ordering::Equal),
            (Condition::Like(_, pattern), Some(f)) => like(&text_of(f), pattern),
            (Condition::Gt(_, v), Some(f)) => compare_values(f, v) == Some(Ordering::Greater),
            (Condition::Gte(_, v), Some(f)) => matches!(
                compare_values(f, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (Condition::Lt(_, v), Some(f)) => compare_values(f, v) == Some(Ordering::Less),
            (Condition::Lte(_, v), Some(f)) => {
                matches!(compare_values(f, v), Some(Ordering::Less | Ordering::Equal))
            }
            (Condition::In(_, vs), Some(f)) => vs
                .iter()
                .any(|v| compare_values(f, v) == Some(Ordering::Equal)),
            (Condition::NotIn(_, vs), Some(f)) => vs
                .iter()
                .all(|v| compare_values(f, v) != Some(Ordering::Equal)),
        }
    }
}

/// An immutable filter/sort specification passed into each query.
///
/// Built fluently; every builder method consumes and returns the value, so a
/// `Criteria` handed to a repository call can never be altered by that call.
///
/// ```ignore
/// let active_admins = Criteria::new()
///     .where_eq("status", "active")
///     .where_in("role", ["admin", "owner"])
///     .order_by("created_at", SortDirection::Desc)
///     .limit(10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    conditions: Vec<Condition>,
    order: Vec<(String, SortDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Eq(column.to_string(), value.into()))
    }

    pub fn where_not_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::NotEq(column.to_string(), value.into()))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.filter(Condition::Like(column.to_string(), pattern.to_string()))
    }

    pub fn where_gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Gt(column.to_string(), value.into()))
    }

    pub fn where_gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Gte(column.to_string(), value.into()))
    }

    pub fn where_lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Lt(column.to_string(), value.into()))
    }

    pub fn where_lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Lte(column.to_string(), value.into()))
    }

    pub fn where_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Condition::In(column.to_string(), values))
    }

    pub fn where_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Condition::NotIn(column.to_string(), values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.filter(Condition::IsNull(column.to_string()))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.filter(Condition::IsNotNull(column.to_string()))
    }

    /// Equality on every field of `attributes`.
    pub fn where_all(self, attributes: &Record) -> Self {
        attributes
            .iter()
            .fold(self, |c, (column, value)| c.where_eq(column, value.clone()))
    }

    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    /// Append `other`'s ordering after this criteria's own ordering.
    pub fn then_order(mut self, other: &Criteria) -> Self {
        self.order.extend(other.order.iter().cloned());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The same filters, without ordering and paging.
    pub fn filters_only(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            ..Self::default()
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order(&self) -> &[(String, SortDirection)] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.order.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
    }

    /// Whether every condition holds for `record`.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Stable sort by the ordering columns. Nulls sort first ascending.
    pub fn sort(&self, records: &mut [Record]) {
        if self.order.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for (column, direction) in &self.order {
                let ord = compare_nullable(a.get(column), b.get(column));
                let ord = match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    /// Filter, sort and page an in-memory row set.
    pub fn apply(&self, rows: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut matched: Vec<Record> = rows.into_iter().filter(|r| self.matches(r)).collect();
        self.sort(&mut matched);
        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        matched.into_iter().skip(offset).take(limit).collect()
    }
}

/// Order two optional values, treating missing and null as smallest.
pub(crate) fn compare_nullable(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

/// Compare two non-null scalars. Numbers compare numerically, also against
/// numeric strings; strings compare bytewise. Mismatched kinds are unordered.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            let (x, y) = (number_of(a)?, number_of(b)?);
            x.partial_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

pub(crate) fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL `LIKE`: `%` matches any run, `_` one character, ASCII case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    // iterative wildcard match with single backtrack point
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_equality_is_numeric_aware() {
        let row = record(json!({"id": 1, "name": "a"}));
        assert!(Criteria::new().where_eq("id", 1).matches(&row));
        assert!(Criteria::new().where_eq("id", 1.0).matches(&row));
        assert!(Criteria::new().where_eq("id", "1").matches(&row));
        assert!(!Criteria::new().where_eq("id", 2).matches(&row));
    }

    #[test]
    fn test_null_semantics() {
        let row = record(json!({"id": 1, "deleted_at": null}));
        assert!(Criteria::new().where_null("deleted_at").matches(&row));
        assert!(Criteria::new().where_null("missing").matches(&row));
        assert!(Criteria::new().where_eq("deleted_at", Value::Null).matches(&row));
        assert!(!Criteria::new().where_not_eq("deleted_at", 1).matches(&row));
        assert!(!Criteria::new().where_gt("deleted_at", 0).matches(&row));
    }

    #[test]
    fn test_in_and_not_in() {
        let row = record(json!({"role": "admin"}));
        assert!(Criteria::new().where_in("role", ["admin", "owner"]).matches(&row));
        assert!(!Criteria::new().where_in("role", Vec::<&str>::new()).matches(&row));
        assert!(Criteria::new().where_not_in("role", ["guest"]).matches(&row));
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("Hello World", "hello%"));
        assert!(like("Hello World", "%WORLD"));
        assert!(like("abc", "a_c"));
        assert!(like("abc", "%"));
        assert!(!like("abc", "a_"));
        assert!(like("aXbXc", "%b%c"));
    }

    #[test]
    fn test_sort_is_stable_with_nulls_first() {
        let rows = vec![
            record(json!({"id": 1, "rank": 2})),
            record(json!({"id": 2, "rank": null})),
            record(json!({"id": 3, "rank": 1})),
            record(json!({"id": 4, "rank": 2})),
        ];
        let sorted = Criteria::new().order_by("rank", SortDirection::Asc).apply(rows.clone());
        let ids: Vec<_> = sorted.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3), json!(1), json!(4)]);

        let sorted = Criteria::new().order_by("rank", SortDirection::Desc).apply(rows);
        let ids: Vec<_> = sorted.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(4), json!(3), json!(2)]);
    }

    #[test]
    fn test_apply_pages_after_sorting() {
        let rows = (1..=5).map(|i| record(json!({"id": i})));
        let page = Criteria::new()
            .order_by("id", SortDirection::Desc)
            .offset(1)
            .limit(2)
            .apply(rows);
        let ids: Vec<_> = page.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(4), json!(3)]);
    }

    #[test]
    fn test_builder_does_not_touch_the_original() {
        let base = Criteria::new().where_eq("status", "active");
        let narrowed = base.clone().where_eq("role", "admin").limit(1);
        assert_eq!(base.conditions().len(), 1);
        assert_eq!(narrowed.conditions().len(), 2);
        assert_eq!(narrowed.filters_only().limit_value(), None);
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse(" asc "), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("des"), None);
    }
}
