use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OnedbError;

/// The statement kind a [`Query`](super::Query) renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Action {
    /// SELECT / find
    #[default]
    Select,
    /// INSERT / insert_many
    Insert,
    /// UPDATE / update_many
    Update,
    /// DELETE / delete_many
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Select => write!(f, "SELECT"),
            Action::Insert => write!(f, "INSERT"),
            Action::Update => write!(f, "UPDATE"),
            Action::Delete => write!(f, "DELETE"),
        }
    }
}

/// Operators accepted by the string form of the builder (`and_where("age", ">", 18)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    NotLike,
    In,
    NotIn,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn sql_symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether this is a plain binary comparison.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_symbol())
    }
}

impl FromStr for Operator {
    type Err = OnedbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" | "==" | "EQ" => Ok(Operator::Eq),
            "!=" | "<>" | "NE" => Ok(Operator::Ne),
            ">" | "GT" => Ok(Operator::Gt),
            ">=" | "GTE" => Ok(Operator::Gte),
            "<" | "LT" => Ok(Operator::Lt),
            "<=" | "LTE" => Ok(Operator::Lte),
            "LIKE" => Ok(Operator::Like),
            "ILIKE" => Ok(Operator::ILike),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "BETWEEN" => Ok(Operator::Between),
            "NOT BETWEEN" => Ok(Operator::NotBetween),
            "IS NULL" => Ok(Operator::IsNull),
            "IS NOT NULL" => Ok(Operator::IsNotNull),
            _ => Err(OnedbError::InvalidQuery(format!("unknown operator '{}'", s))),
        }
    }
}

/// Comparison operators allowed in a [`Predicate::Compare`](super::Predicate::Compare) leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn sql_symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }

    /// Document-store operator name (`$gt`, ...). `Eq` maps to `$eq`.
    pub fn mongo_operator(&self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
        }
    }
}

impl TryFrom<Operator> for CompareOp {
    type Error = Operator;

    fn try_from(op: Operator) -> Result<Self, Self::Error> {
        match op {
            Operator::Eq => Ok(CompareOp::Eq),
            Operator::Ne => Ok(CompareOp::Ne),
            Operator::Gt => Ok(CompareOp::Gt),
            Operator::Gte => Ok(CompareOp::Gte),
            Operator::Lt => Ok(CompareOp::Lt),
            Operator::Lte => Ok(CompareOp::Lte),
            other => Err(other),
        }
    }
}

/// Join type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }
}

impl FromStr for JoinKind {
    type Err = OnedbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INNER" | "JOIN" => Ok(JoinKind::Inner),
            "LEFT" | "LEFT OUTER" => Ok(JoinKind::Left),
            "RIGHT" | "RIGHT OUTER" => Ok(JoinKind::Right),
            "FULL" | "FULL OUTER" | "OUTER" => Ok(JoinKind::Full),
            _ => Err(OnedbError::InvalidQuery(format!("unknown join type '{}'", s))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// `1` / `-1` as used by document stores.
    pub fn as_sign(&self) -> i64 {
        match self {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        }
    }
}

impl FromStr for SortOrder {
    type Err = OnedbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" | "ASCENDING" => Ok(SortOrder::Asc),
            "DESC" | "DESCENDING" => Ok(SortOrder::Desc),
            _ => Err(OnedbError::InvalidQuery(format!("unknown sort direction '{}'", s))),
        }
    }
}

/// Aggregate functions usable in projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunc::Count => write!(f, "COUNT"),
            AggregateFunc::Sum => write!(f, "SUM"),
            AggregateFunc::Avg => write!(f, "AVG"),
            AggregateFunc::Min => write!(f, "MIN"),
            AggregateFunc::Max => write!(f, "MAX"),
        }
    }
}

impl AggregateFunc {
    /// Accumulator name in an aggregation pipeline `$group` stage.
    pub fn mongo_accumulator(&self) -> &'static str {
        match self {
            AggregateFunc::Count | AggregateFunc::Sum => "$sum",
            AggregateFunc::Avg => "$avg",
            AggregateFunc::Min => "$min",
            AggregateFunc::Max => "$max",
        }
    }
}
