//! Query Building Blocks
//!
//! Column filters, ordering and the select query shared by the REST layer,
//! the change-feed filters and the client SDK.
//!
//! Filters use the `column=op.value` notation on the wire, e.g.
//! `user_id=eq.3f1c...` or, as a query parameter, `user_id` → `eq.3f1c...`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{StoreError, StoreResult};
use super::types::Bookmark;

/// Columns of the bookmarks relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Title,
    Url,
    UserId,
    CreatedAt,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Title => "title",
            Column::Url => "url",
            Column::UserId => "user_id",
            Column::CreatedAt => "created_at",
        }
    }
}

impl FromStr for Column {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Column::Id),
            "title" => Ok(Column::Title),
            "url" => Ok(Column::Url),
            "user_id" => Ok(Column::UserId),
            "created_at" => Ok(Column::CreatedAt),
            other => Err(StoreError::UnknownColumn(other.to_string())),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "<>",
        }
    }
}

/// A single column comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub column: Column,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn eq(column: Column, value: impl Into<String>) -> Self {
        Self {
            column,
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn neq(column: Column, value: impl Into<String>) -> Self {
        Self {
            column,
            op: FilterOp::Neq,
            value: value.into(),
        }
    }

    /// Parse a query-parameter pair such as (`user_id`, `eq.abc`)
    pub fn parse_param(column: &str, expr: &str) -> StoreResult<Self> {
        let column: Column = column.parse()?;
        let (op, value) = expr
            .split_once('.')
            .ok_or_else(|| StoreError::InvalidFilter(format!("{}={}", column, expr)))?;

        let op = match op {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "unsupported operator '{}' on column {}",
                    other, column
                )))
            }
        };

        Ok(Self {
            column,
            op,
            value: value.to_string(),
        })
    }

    /// Parse the compact `column=op.value` form used by change-feed filters
    pub fn parse_expr(expr: &str) -> StoreResult<Self> {
        let (column, rest) = expr
            .split_once('=')
            .ok_or_else(|| StoreError::InvalidFilter(expr.to_string()))?;
        Self::parse_param(column.trim(), rest.trim())
    }

    /// Render as `column=op.value`
    pub fn to_expr(&self) -> String {
        format!("{}={}.{}", self.column, self.op.as_str(), self.value)
    }

    /// Render as a query-parameter pair
    pub fn to_param(&self) -> (String, String) {
        (
            self.column.as_str().to_string(),
            format!("{}.{}", self.op.as_str(), self.value),
        )
    }

    /// Evaluate against a row
    pub fn matches(&self, row: &Bookmark) -> bool {
        let actual = match row.column(self.column.as_str()) {
            Some(v) => v,
            None => return false,
        };
        match self.op {
            FilterOp::Eq => actual == self.value,
            FilterOp::Neq => actual != self.value,
        }
    }

    pub(crate) fn sql_clause(&self) -> String {
        format!("{} {} ?", self.column.as_str(), self.op.sql())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: Column,
    pub direction: Direction,
}

impl Order {
    pub fn desc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }

    pub fn asc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    /// Parse `created_at.desc` / `title.asc` / `title` (ascending)
    pub fn parse(s: &str) -> StoreResult<Self> {
        let (column, direction) = match s.split_once('.') {
            Some((c, "desc")) => (c, Direction::Desc),
            Some((c, "asc")) => (c, Direction::Asc),
            Some((_, other)) => {
                return Err(StoreError::InvalidFilter(format!(
                    "unsupported order direction '{}'",
                    other
                )))
            }
            None => (s, Direction::Asc),
        };

        Ok(Self {
            column: column.parse()?,
            direction,
        })
    }

    pub fn to_param(&self) -> String {
        let dir = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        format!("{}.{}", self.column, dir)
    }

    pub(crate) fn sql_clause(&self) -> String {
        let dir = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        // seq breaks ties in insertion order
        format!("{} {dir}, seq {dir}", self.column.as_str())
    }
}

/// Filtered, ordered select over bookmarks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: Column, value: impl Into<String>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The dashboard's list query: one owner, newest first
    pub fn owned_by(user_id: &str) -> Self {
        Self::new()
            .eq(Column::UserId, user_id)
            .order(Order::desc(Column::CreatedAt))
    }

    /// Query-parameter form used by the REST endpoint
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> =
            self.filters.iter().map(Filter::to_param).collect();
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.to_param()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Inverse of [`SelectQuery::to_params`]
    pub fn from_params<'a, I>(params: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut query = SelectQuery::new();
        for (key, value) in params {
            match key {
                "select" => {}
                "order" => query.order = Some(Order::parse(value)?),
                "limit" => {
                    let limit = value.parse().map_err(|_| {
                        StoreError::InvalidFilter(format!("invalid limit '{}'", value))
                    })?;
                    query.limit = Some(limit);
                }
                column => query.filters.push(Filter::parse_param(column, value)?),
            }
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(user: &str) -> Bookmark {
        Bookmark {
            id: "b-1".to_string(),
            title: "Rust".to_string(),
            url: "https://rust-lang.org".to_string(),
            user_id: user.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_expr() {
        let filter = Filter::parse_expr("user_id=eq.abc-123").unwrap();
        assert_eq!(filter.column, Column::UserId);
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, "abc-123");
        assert_eq!(filter.to_expr(), "user_id=eq.abc-123");
    }

    #[test]
    fn test_parse_value_with_dots() {
        let filter = Filter::parse_param("url", "eq.https://a.b.c").unwrap();
        assert_eq!(filter.value, "https://a.b.c");
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            Filter::parse_expr("owner=eq.x"),
            Err(StoreError::UnknownColumn(_))
        ));
        assert!(matches!(
            Filter::parse_expr("user_id=gt.5"),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(Filter::parse_expr("user_id").is_err());
    }

    #[test]
    fn test_filter_matches() {
        let eq = Filter::eq(Column::UserId, "u-1");
        let neq = Filter::neq(Column::UserId, "u-1");
        assert!(eq.matches(&row("u-1")));
        assert!(!eq.matches(&row("u-2")));
        assert!(neq.matches(&row("u-2")));
    }

    #[test]
    fn test_order_parse() {
        assert_eq!(
            Order::parse("created_at.desc").unwrap(),
            Order::desc(Column::CreatedAt)
        );
        assert_eq!(Order::parse("title").unwrap(), Order::asc(Column::Title));
        assert!(Order::parse("title.sideways").is_err());
    }

    #[test]
    fn test_select_params() {
        let query = SelectQuery::owned_by("u-9").limit(10);
        let params = query.to_params();
        assert!(params.contains(&("user_id".to_string(), "eq.u-9".to_string())));
        assert!(params.contains(&("order".to_string(), "created_at.desc".to_string())));

        let parsed =
            SelectQuery::from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .unwrap();
        assert_eq!(parsed, query);
    }
}
