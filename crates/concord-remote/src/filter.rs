//! Filter composition for table queries.
//!
//! One expression type, two interpreters: [`Filter::to_query`] renders
//! the remote service's query-parameter grammar
//! (`col=eq.v`, `or=(and(from.eq.a,to.eq.b),and(from.eq.b,to.eq.a))`),
//! and [`Filter::matches`] evaluates the same expression against a JSON
//! row for the in-memory backend and client-side event filtering.

use serde_json::Value;

/// A composable row predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Exact column equality.
    Eq(String, String),
    /// Case-insensitive pattern match; `%` (or `*`) is the wildcard.
    Ilike(String, String),
    /// Column value is one of the listed values.
    In(String, Vec<String>),
    /// All sub-filters hold.
    And(Vec<Filter>),
    /// At least one sub-filter holds.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<String>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn ilike(column: &str, pattern: impl Into<String>) -> Self {
        Filter::Ilike(column.to_string(), pattern.into())
    }

    pub fn in_(column: &str, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// The unordered-pair predicate: `(a,b)` in either column order.
    ///
    /// This is the OR-of-two-ANDs shape used for friend requests and DM
    /// threads, since the storage layer has no native unordered index on
    /// the legacy rows.
    pub fn unordered_pair(col_a: &str, col_b: &str, a: &str, b: &str) -> Self {
        Filter::or([
            Filter::and([Filter::eq(col_a, a), Filter::eq(col_b, b)]),
            Filter::and([Filter::eq(col_a, b), Filter::eq(col_b, a)]),
        ])
    }

    // ------------------------------------------------------------------
    // Query rendering
    // ------------------------------------------------------------------

    /// Render to query parameters.
    ///
    /// A top-level `And` contributes one parameter per child; `Or` (and
    /// nested combinators) collapse into the `or=(...)` form.
    pub fn to_query(&self) -> Vec<(String, String)> {
        match self {
            Filter::And(children) => children.iter().flat_map(Filter::to_query).collect(),
            Filter::Eq(col, v) => vec![(col.clone(), format!("eq.{v}"))],
            Filter::Ilike(col, p) => vec![(col.clone(), format!("ilike.{}", p.replace('%', "*")))],
            Filter::In(col, vs) => vec![(col.clone(), format!("in.({})", vs.join(",")))],
            Filter::Or(children) => vec![(
                "or".to_string(),
                format!(
                    "({})",
                    children
                        .iter()
                        .map(Filter::render_operand)
                        .collect::<Vec<_>>()
                        .join(",")
                ),
            )],
        }
    }

    /// Render as an operand inside a combinator.
    fn render_operand(&self) -> String {
        match self {
            Filter::Eq(col, v) => format!("{col}.eq.{v}"),
            Filter::Ilike(col, p) => format!("{col}.ilike.{}", p.replace('%', "*")),
            Filter::In(col, vs) => format!("{col}.in.({})", vs.join(",")),
            Filter::And(children) => format!(
                "and({})",
                children
                    .iter()
                    .map(Filter::render_operand)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Filter::Or(children) => format!(
                "or({})",
                children
                    .iter()
                    .map(Filter::render_operand)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    // ------------------------------------------------------------------
    // Row evaluation
    // ------------------------------------------------------------------

    /// Evaluate the predicate against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(col, v) => column_text(row, col).as_deref() == Some(v.as_str()),
            Filter::Ilike(col, pattern) => column_text(row, col)
                .map(|text| ilike(pattern, &text))
                .unwrap_or(false),
            Filter::In(col, vs) => column_text(row, col)
                .map(|text| vs.iter().any(|v| v == &text))
                .unwrap_or(false),
            Filter::And(children) => children.iter().all(|f| f.matches(row)),
            Filter::Or(children) => children.iter().any(|f| f.matches(row)),
        }
    }
}

/// Extract a column as text for comparison.
fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Case-insensitive wildcard match; `%` and `*` both mean "any run of
/// characters".
fn ilike(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase().replace('*', "%");
    let value = value.to_lowercase();

    let segments: Vec<&str> = pattern.split('%').collect();
    if segments.len() == 1 {
        return pattern == value;
    }

    let mut pos = 0;
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !value.starts_with(segment) {
                return false;
            }
            pos = segment.len();
        } else if i == last {
            let tail = &value[pos.min(value.len())..];
            if !tail.ends_with(segment) {
                return false;
            }
        } else {
            match value[pos.min(value.len())..].find(segment) {
                Some(found) => pos += found + segment.len(),
                None => return false,
            }
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Result ordering by a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }

    /// Query-parameter form, e.g. `("order", "time.asc")`.
    pub fn to_query(&self) -> (String, String) {
        let dir = if self.ascending { "asc" } else { "desc" };
        ("order".to_string(), format!("{}.{dir}", self.column))
    }
}
