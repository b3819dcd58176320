//! Query description shared by every store backend

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::store::value::DocumentValue;

/// Comparison operator of a single filter clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    In,
    NotIn,
    ArrayContainsAny,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported operator '{0}'")]
pub struct UnknownOperator(pub String);

impl FilterOp {
    pub const ALL: [Self; 10] = [
        Self::Equal,
        Self::NotEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::ArrayContains,
        Self::In,
        Self::NotIn,
        Self::ArrayContainsAny,
    ];

    /// Operator as written by callers
    #[inline]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::ArrayContains => "array-contains",
            Self::In => "in",
            Self::NotIn => "not-in",
            Self::ArrayContainsAny => "array-contains-any",
        }
    }

    /// Operators whose operand must be a list of values
    #[inline]
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::ArrayContainsAny)
    }
}

impl FromStr for FilterOp {
    type Err = UnknownOperator;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Client SDKs spell the array operators with underscores
        let normalized = s.trim().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == normalized)
            .ok_or_else(|| UnknownOperator(s.to_string()))
    }
}

impl fmt::Display for FilterOp {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `(field, operator, value)` constraint; all clauses of a query are ANDed
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: DocumentValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    /// `"desc"` selects descending order, anything else ascending
    #[inline]
    pub fn from_arg(direction: Option<&str>) -> Self {
        match direction {
            Some("desc") => Self::Descending,
            _ => Self::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: String,
    pub direction: Direction,
}

/// Normalized filter + order + limit description of a collection query
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub collection: String,
    pub filters: Vec<FilterClause>,
    pub order_by: Option<OrderSpec>,
    pub limit: Option<u32>,
}

impl QuerySpec {
    #[inline]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: DocumentValue) -> Self {
        self.filters.push(FilterClause {
            field: field.into(),
            op,
            value,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderSpec {
            field: field.into(),
            direction,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
