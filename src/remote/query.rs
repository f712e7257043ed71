// ============================================================================
// Row Filters and Read Queries
// ============================================================================

use super::{Row, Table, row_id};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Column equals the JSON value.
    Eq(String, Value),
    /// Column is missing or null.
    IsNull(String),
    /// Column is present and not null.
    NotNull(String),
}

impl Condition {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Eq(field, expected) => row.get(field) == Some(expected),
            Condition::IsNull(field) => row.get(field).is_none_or(Value::is_null),
            Condition::NotNull(field) => row.get(field).is_some_and(|value| !value.is_null()),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Eq(field, value) => write!(f, "{} = {}", field, value),
            Condition::IsNull(field) => write!(f, "{} IS NULL", field),
            Condition::NotNull(field) => write!(f, "{} IS NOT NULL", field),
        }
    }
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq<T: Serialize>(mut self, field: &str, value: T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.conditions.push(Condition::Eq(field.to_string(), value));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.conditions.push(Condition::IsNull(field.to_string()));
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.conditions.push(Condition::NotNull(field.to_string()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|condition| condition.matches(row))
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("TRUE");
        }
        for (index, condition) in self.conditions.iter().enumerate() {
            if index > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{}", condition)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

/// A read against one table.
///
/// `after` is a keyset cursor: the id of the last row of the previous page.
/// Results start immediately after that row in the requested order; if the
/// cursor row is not part of the filtered set the page is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filter: Filter,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub after: Option<Uuid>,
}

impl Query {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filter: Filter::new(),
            order: None,
            limit: None,
            after: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order = Some(Order {
            field: field.to_string(),
            descending,
        });
        self
    }

    pub fn order_desc(self, field: &str) -> Self {
        self.order_by(field, true)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, cursor: Option<Uuid>) -> Self {
        self.after = cursor;
        self
    }

    /// Evaluates the query over an in-memory table.
    pub fn execute<'a, I>(&self, rows: I) -> Vec<Row>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut selected: Vec<&Row> = rows.into_iter().filter(|row| self.filter.matches(row)).collect();

        if let Some(order) = &self.order {
            selected.sort_by(|left, right| {
                let ordering = compare_values(left.get(&order.field), right.get(&order.field));
                let ordering = if order.descending { ordering.reverse() } else { ordering };
                // Stable tie-break keeps keyset pagination deterministic.
                ordering.then_with(|| row_id(left).cmp(&row_id(right)))
            });
        }

        let start = match self.after {
            Some(cursor) => match selected.iter().position(|row| row_id(row) == Some(cursor)) {
                Some(position) => position + 1,
                None => return Vec::new(),
            },
            None => 0,
        };

        let iter = selected.into_iter().skip(start).cloned();
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Total order over JSON column values. Missing and null sort first.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}
