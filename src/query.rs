//! Structured filter builder for the read endpoints.
//!
//! List/search queries are assembled from a list of typed predicates and
//! rendered to a parameterized WHERE clause. User input only ever travels
//! through bind parameters, never through string concatenation.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

#[derive(Debug, Clone)]
pub enum Arg {
    Int(i64),
    Text(String),
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl Arg {
    fn into_value(self) -> Value {
        match self {
            Self::Int(v) => Value::Integer(v),
            Self::Text(v) => Value::Text(v),
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Eq(&'static str, Arg),
    /// Substring containment across any of the named columns.
    Like(&'static [&'static str], String),
    Since(&'static str, DateTime<Utc>),
    Until(&'static str, DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Arg>) -> Self {
        self.predicates.push(Predicate::Eq(column, value.into()));
        self
    }

    pub fn like(mut self, columns: &'static [&'static str], needle: &str) -> Self {
        self.predicates
            .push(Predicate::Like(columns, needle.to_string()));
        self
    }

    pub fn since(mut self, column: &'static str, ts: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::Since(column, ts));
        self
    }

    pub fn until(mut self, column: &'static str, ts: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::Until(column, ts));
        self
    }

    /// Renders `" WHERE …"` (or an empty string) plus the bind values in
    /// positional order.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        if self.predicates.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut clauses = Vec::with_capacity(self.predicates.len());
        let mut values = Vec::new();
        for predicate in &self.predicates {
            match predicate {
                Predicate::Eq(column, arg) => {
                    clauses.push(format!("{column} = ?"));
                    values.push(arg.clone().into_value());
                }
                Predicate::Like(columns, needle) => {
                    let pattern = format!("%{needle}%");
                    let ors: Vec<String> =
                        columns.iter().map(|c| format!("{c} LIKE ?")).collect();
                    clauses.push(format!("({})", ors.join(" OR ")));
                    for _ in columns.iter() {
                        values.push(Value::Text(pattern.clone()));
                    }
                }
                Predicate::Since(column, ts) => {
                    clauses.push(format!("{column} >= ?"));
                    values.push(Value::Text(ts.to_rfc3339()));
                }
                Predicate::Until(column, ts) => {
                    clauses.push(format!("{column} <= ?"));
                    values.push(Value::Text(ts.to_rfc3339()));
                }
            }
        }
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_filter_renders_nothing() {
        let (sql, values) = Filter::new().to_sql();
        assert_eq!(sql, "");
        assert!(values.is_empty());
    }

    #[test]
    fn predicates_join_with_and() {
        let since = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let (sql, values) = Filter::new()
            .eq("project_id", 7)
            .eq("type", "phase_change")
            .since("created_at", since)
            .to_sql();
        assert_eq!(
            sql,
            " WHERE project_id = ? AND type = ? AND created_at >= ?"
        );
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Value::Integer(7));
        assert_eq!(values[1], Value::Text("phase_change".into()));
    }

    #[test]
    fn like_fans_out_across_columns() {
        let (sql, values) = Filter::new().like(&["title", "description"], "launch").to_sql();
        assert_eq!(sql, " WHERE (title LIKE ? OR description LIKE ?)");
        assert_eq!(values, vec![Value::Text("%launch%".into()); 2]);
    }
}
