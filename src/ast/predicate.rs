use serde::Serialize;

use super::operators::{CompareOp, Operator};
use crate::error::{OnedbError, Result};
use crate::value::Value;

/// A node of a WHERE / HAVING tree.
///
/// Leaves compare one column against values; `And`, `Or` and `Not` own their
/// children, so a tree is always finite and acyclic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    /// `column <op> value`
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    /// `column [NOT] IN (values...)`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// `column [NOT] LIKE pattern`, optionally case-insensitive.
    Like {
        column: String,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lte, value)
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Predicate::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::Null {
            column: column.into(),
            negated: false,
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Predicate::Null {
            column: column.into(),
            negated: true,
        }
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: pattern.into(),
            case_insensitive: false,
            negated: false,
        }
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: pattern.into(),
            case_insensitive: true,
            negated: false,
        }
    }

    /// Build a leaf from the string operator form used by `and_where`.
    ///
    /// `IN`/`NOT IN` need an array value, `BETWEEN` a two element array and
    /// the null checks no value at all.
    pub fn from_operator(column: impl Into<String>, op: Operator, value: Value) -> Result<Self> {
        let column = column.into();
        if column.trim().is_empty() {
            return Err(OnedbError::invalid_query("predicate column name is empty"));
        }

        if let Ok(cmp) = CompareOp::try_from(op) {
            if value.is_null() {
                // `col = NULL` never matches; express the intent instead.
                return match cmp {
                    CompareOp::Eq => Ok(Predicate::is_null(column)),
                    CompareOp::Ne => Ok(Predicate::is_not_null(column)),
                    _ => Err(OnedbError::invalid_query(format!(
                        "cannot compare '{}' {} NULL",
                        column,
                        cmp.sql_symbol()
                    ))),
                };
            }
            return Ok(Predicate::compare(column, cmp, value));
        }

        match op {
            Operator::In | Operator::NotIn => match value {
                Value::Array(values) => Ok(Predicate::In {
                    column,
                    values,
                    negated: op == Operator::NotIn,
                }),
                other => Err(OnedbError::invalid_query(format!(
                    "{} on '{}' requires an array, got {}",
                    op,
                    column,
                    other.type_name()
                ))),
            },
            Operator::Between | Operator::NotBetween => match value {
                Value::Array(mut bounds) if bounds.len() == 2 => {
                    let high = bounds.pop().unwrap_or_default();
                    let low = bounds.pop().unwrap_or_default();
                    Ok(Predicate::Between {
                        column,
                        low,
                        high,
                        negated: op == Operator::NotBetween,
                    })
                }
                _ => Err(OnedbError::invalid_query(format!(
                    "{} on '{}' requires exactly two bounds",
                    op, column
                ))),
            },
            Operator::IsNull | Operator::IsNotNull => {
                if !value.is_null() {
                    return Err(OnedbError::invalid_query(format!(
                        "{} on '{}' takes no value",
                        op, column
                    )));
                }
                Ok(Predicate::Null {
                    column,
                    negated: op == Operator::IsNotNull,
                })
            }
            Operator::Like | Operator::ILike | Operator::NotLike => match value {
                Value::String(pattern) => Ok(Predicate::Like {
                    column,
                    pattern,
                    case_insensitive: op == Operator::ILike,
                    negated: op == Operator::NotLike,
                }),
                other => Err(OnedbError::invalid_query(format!(
                    "{} on '{}' requires a string pattern, got {}",
                    op,
                    column,
                    other.type_name()
                ))),
            },
            _ => Err(OnedbError::invalid_query(format!("unsupported operator {}", op))),
        }
    }

    /// Conjunction, flattening nested ANDs.
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut children) => {
                match other {
                    Predicate::And(more) => children.extend(more),
                    other => children.push(other),
                }
                Predicate::And(children)
            }
            first => match other {
                Predicate::And(mut more) => {
                    more.insert(0, first);
                    Predicate::And(more)
                }
                other => Predicate::And(vec![first, other]),
            },
        }
    }

    /// Disjunction, flattening nested ORs.
    pub fn or(self, other: Predicate) -> Predicate {
        match self {
            Predicate::Or(mut children) => {
                match other {
                    Predicate::Or(more) => children.extend(more),
                    other => children.push(other),
                }
                Predicate::Or(children)
            }
            first => match other {
                Predicate::Or(mut more) => {
                    more.insert(0, first);
                    Predicate::Or(more)
                }
                other => Predicate::Or(vec![first, other]),
            },
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    pub fn is_combinator(&self) -> bool {
        matches!(self, Predicate::And(_) | Predicate::Or(_) | Predicate::Not(_))
    }

    /// Column referenced by a leaf, `None` for combinators.
    pub fn column(&self) -> Option<&str> {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::In { column, .. }
            | Predicate::Between { column, .. }
            | Predicate::Null { column, .. }
            | Predicate::Like { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Every column referenced anywhere in the tree, in visit order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
            leaf => {
                if let Some(col) = leaf.column() {
                    out.push(col);
                }
            }
        }
    }

    /// Check structural well-formedness: named leaves and non-empty combinators.
    pub fn validate(&self) -> Result<()> {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                if children.is_empty() {
                    return Err(OnedbError::invalid_query("empty logical combinator"));
                }
                children.iter().try_for_each(Predicate::validate)
            }
            Predicate::Not(inner) => inner.validate(),
            leaf => match leaf.column() {
                Some(col) if !col.trim().is_empty() => Ok(()),
                _ => Err(OnedbError::invalid_query("predicate column name is empty")),
            },
        }
    }
}
