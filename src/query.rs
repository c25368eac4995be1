// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query AST for adapter lookups.
//!
//! Provides a typed predicate that every adapter evaluates the same way,
//! instead of passing open-ended filter dictionaries around.
//!
//! # Example
//!
//! ```rust
//! use sync_orchestrator::query::{Query, QueryBuilder, QueryValue};
//!
//! // Simple field query
//! let query = Query::field_eq("status", "open");
//!
//! // Builder with AND semantics
//! let query = QueryBuilder::new()
//!     .field_eq("status", "open")
//!     .range("priority", Some(1.0), Some(3.0))
//!     .build_and();
//!
//! // Boolean combinations
//! let query = Query::field_eq("status", "open")
//!     .or(Query::field_in("labels", vec![QueryValue::from("bug")]));
//! ```

use std::cmp::Ordering;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;

/// Query AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Root query node
    pub root: QueryNode,
}

impl Query {
    pub fn new(root: QueryNode) -> Self {
        Self { root }
    }

    /// Matches every entity
    pub fn all() -> Self {
        Self::new(QueryNode::All)
    }

    fn field(field: impl Into<String>, operator: FieldOperator, value: QueryValue) -> Self {
        Self::new(QueryNode::Field(FieldQuery {
            field: field.into(),
            operator,
            value,
        }))
    }

    /// `field == value`
    pub fn field_eq(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::field(field, FieldOperator::Equals, value.into())
    }

    /// `field != value` (also true when the field is absent)
    pub fn field_ne(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::field(field, FieldOperator::NotEquals, value.into())
    }

    /// `id == value`
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::field_eq("id", id.into())
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::field(field, FieldOperator::GreaterThan, value.into())
    }

    pub fn greater_or_equal(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::field(field, FieldOperator::GreaterOrEqual, value.into())
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::field(field, FieldOperator::LessThan, value.into())
    }

    pub fn less_or_equal(field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        Self::field(field, FieldOperator::LessOrEqual, value.into())
    }

    /// Inclusive numeric range; open on either side when `None`.
    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::field(field, FieldOperator::Range, QueryValue::Range { min, max })
    }

    /// Set membership. Array fields match when any element is in the set.
    pub fn field_in(field: impl Into<String>, values: Vec<QueryValue>) -> Self {
        Self::field(field, FieldOperator::In, QueryValue::List(values))
    }

    pub fn field_not_in(field: impl Into<String>, values: Vec<QueryValue>) -> Self {
        Self::field(field, FieldOperator::NotIn, QueryValue::List(values))
    }

    /// Field presence (`true`) or absence (`false`)
    pub fn exists(field: impl Into<String>, present: bool) -> Self {
        Self::field(field, FieldOperator::Exists, QueryValue::Boolean(present))
    }

    /// Combine with AND
    pub fn and(self, other: Query) -> Self {
        Self::new(QueryNode::And(vec![self.root, other.root]))
    }

    /// Combine with OR
    pub fn or(self, other: Query) -> Self {
        Self::new(QueryNode::Or(vec![self.root, other.root]))
    }

    /// Negate query
    pub fn negate(self) -> Self {
        Self::new(QueryNode::Not(Box::new(self.root)))
    }

    /// If this query is a plain `id == "<value>"` lookup, return the id.
    pub fn as_id_lookup(&self) -> Option<&str> {
        match &self.root {
            QueryNode::Field(FieldQuery {
                field,
                operator: FieldOperator::Equals,
                value: QueryValue::Text(id),
            }) if field == "id" => Some(id),
            _ => None,
        }
    }

    /// Evaluate the query against an entity.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.root.matches(entity)
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

/// Query AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    /// Match everything
    All,
    /// Single field predicate
    Field(FieldQuery),
    /// All children must match (empty = true)
    And(Vec<QueryNode>),
    /// Any child must match (empty = false)
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

impl QueryNode {
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::All => true,
            Self::Field(fq) => fq.matches(entity),
            Self::And(nodes) => nodes.iter().all(|n| n.matches(entity)),
            Self::Or(nodes) => nodes.iter().any(|n| n.matches(entity)),
            Self::Not(node) => !node.matches(entity),
        }
    }
}

/// Field query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Field path (`id`, `type`, `createdAt`, `updatedAt` or a dotted attribute path)
    pub field: String,
    pub operator: FieldOperator,
    pub value: QueryValue,
}

impl FieldQuery {
    fn matches(&self, entity: &Entity) -> bool {
        let actual = entity.field(&self.field);

        match self.operator {
            FieldOperator::Exists => {
                let want = matches!(self.value, QueryValue::Boolean(true));
                actual.is_some() == want
            }
            FieldOperator::Equals => actual.is_some_and(|a| self.value.equals(&a)),
            FieldOperator::NotEquals => !actual.is_some_and(|a| self.value.equals(&a)),
            FieldOperator::GreaterThan => self.compare(actual, |o| o == Ordering::Greater),
            FieldOperator::GreaterOrEqual => self.compare(actual, |o| o != Ordering::Less),
            FieldOperator::LessThan => self.compare(actual, |o| o == Ordering::Less),
            FieldOperator::LessOrEqual => self.compare(actual, |o| o != Ordering::Greater),
            FieldOperator::Range => {
                let (QueryValue::Range { min, max }, Some(n)) =
                    (&self.value, actual.as_ref().and_then(Value::as_f64))
                else {
                    return false;
                };
                min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m)
            }
            FieldOperator::In => actual.is_some_and(|a| self.value.contains(&a)),
            FieldOperator::NotIn => !actual.is_some_and(|a| self.value.contains(&a)),
        }
    }

    fn compare(&self, actual: Option<Value>, accept: impl Fn(Ordering) -> bool) -> bool {
        actual
            .and_then(|a| compare_values(&a, &self.value.to_json()))
            .is_some_and(accept)
    }
}

/// Field comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Inclusive numeric range
    Range,
    /// Set membership
    In,
    NotIn,
    /// Field presence
    Exists,
}

/// Query value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Text(String),
    Numeric(f64),
    Boolean(bool),
    Null,
    /// Numeric range [min, max]
    Range { min: Option<f64>, max: Option<f64> },
    /// Set of values (OR semantics)
    List(Vec<QueryValue>),
}

impl QueryValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Numeric(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Null => Value::Null,
            Self::Range { .. } => Value::Null,
            Self::List(values) => Value::Array(values.iter().map(Self::to_json).collect()),
        }
    }

    /// Scalar equality. Array fields equal a scalar when they contain it.
    fn equals(&self, actual: &Value) -> bool {
        if let (Value::Array(items), false) = (actual, matches!(self, Self::List(_))) {
            return items.iter().any(|item| self.equals(item));
        }
        match (self, actual) {
            (Self::Numeric(a), Value::Number(b)) => b.as_f64() == Some(*a),
            _ => self.to_json() == *actual,
        }
    }

    fn contains(&self, actual: &Value) -> bool {
        let Self::List(values) = self else {
            return self.equals(actual);
        };
        match actual {
            Value::Array(items) => items.iter().any(|item| values.iter().any(|v| v.equals(item))),
            _ => values.iter().any(|v| v.equals(actual)),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for QueryValue {
    fn from(n: f64) -> Self {
        Self::Numeric(n)
    }
}

impl From<i64> for QueryValue {
    fn from(n: i64) -> Self {
        Self::Numeric(n as f64)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// Order two JSON scalars of the same kind. Mixed kinds don't compare.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sort key for `find`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Paging and ordering for `find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
    pub skip: usize,
}

impl FindOptions {
    #[must_use]
    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey { field: field.into(), direction: SortDirection::Ascending });
        self
    }

    #[must_use]
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortKey { field: field.into(), direction: SortDirection::Descending });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Compare two entities by the configured sort keys.
    /// Missing or incomparable fields order as equal.
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        for key in &self.sort {
            let ord = match (a.field(&key.field), b.field(&key.field)) {
                (Some(x), Some(y)) => compare_values(&x, &y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ord = match key.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Builder for complex queries
#[derive(Default)]
pub struct QueryBuilder {
    nodes: Vec<QueryNode>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.nodes.push(Query::field_eq(field, value).root);
        self
    }

    pub fn field_ne(mut self, field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.nodes.push(Query::field_ne(field, value).root);
        self
    }

    pub fn range(mut self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        self.nodes.push(Query::range(field, min, max).root);
        self
    }

    pub fn field_in(mut self, field: impl Into<String>, values: Vec<QueryValue>) -> Self {
        self.nodes.push(Query::field_in(field, values).root);
        self
    }

    pub fn exists(mut self, field: impl Into<String>, present: bool) -> Self {
        self.nodes.push(Query::exists(field, present).root);
        self
    }

    /// Build query with AND semantics (all constraints must match)
    pub fn build_and(self) -> Query {
        self.build(QueryNode::And)
    }

    /// Build query with OR semantics (any constraint can match)
    pub fn build_or(self) -> Query {
        self.build(QueryNode::Or)
    }

    fn build(mut self, combine: fn(Vec<QueryNode>) -> QueryNode) -> Query {
        match self.nodes.len() {
            0 => Query::all(),
            1 => Query::new(self.nodes.remove(0)),
            _ => Query::new(combine(self.nodes)),
        }
    }
}
