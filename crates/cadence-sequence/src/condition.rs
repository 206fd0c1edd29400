//! Declarative filter conditions.
//!
//! Conditions are small predicate trees evaluated against collection
//! items. A condition is authored as data, serialized with the stage,
//! and compiled once into a reusable closure at first execution; the
//! filter handler caches the compiled form per stage id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accessor::Accessor;

/// An operand of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operand", rename_all = "snake_case")]
pub enum Operand {
  /// The collection item itself.
  Item,
  /// A path resolved relative to the item.
  Path { path: Accessor },
  /// A literal JSON value.
  Literal { value: serde_json::Value },
}

/// Comparison operators.
///
/// Ordering applies to numbers (across integer/float representations)
/// and to strings (lexical). `Contains` accepts an array containing an
/// equal element or a string containing a substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
  Contains,
  StartsWith,
}

/// A predicate tree over a collection item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cond", rename_all = "snake_case")]
pub enum Condition {
  Compare {
    left: Operand,
    op: CompareOp,
    right: Operand,
  },
  All {
    conditions: Vec<Condition>,
  },
  Any {
    conditions: Vec<Condition>,
  },
  Not {
    condition: Box<Condition>,
  },
  /// True when the path resolves to a non-null value on the item.
  Exists {
    path: Accessor,
  },
}

type Predicate = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// A condition compiled into a closure tree.
#[derive(Clone)]
pub struct CompiledCondition {
  predicate: Predicate,
}

impl CompiledCondition {
  /// Evaluate the predicate against one item.
  pub fn matches(&self, item: &serde_json::Value) -> bool {
    (self.predicate)(item)
  }
}

impl Condition {
  /// Compile this condition into a reusable predicate.
  pub fn compile(&self) -> CompiledCondition {
    CompiledCondition {
      predicate: compile_node(self),
    }
  }

  /// Interpret the condition directly, without compiling.
  pub fn evaluate(&self, item: &serde_json::Value) -> bool {
    match self {
      Condition::Compare { left, op, right } => {
        compare(&resolve(left, item), *op, &resolve(right, item))
      }
      Condition::All { conditions } => conditions.iter().all(|c| c.evaluate(item)),
      Condition::Any { conditions } => conditions.iter().any(|c| c.evaluate(item)),
      Condition::Not { condition } => !condition.evaluate(item),
      Condition::Exists { path } => path.get(item).is_some_and(|v| !v.is_null()),
    }
  }
}

fn compile_node(condition: &Condition) -> Predicate {
  match condition {
    Condition::Compare { left, op, right } => {
      let left = left.clone();
      let right = right.clone();
      let op = *op;
      Arc::new(move |item| compare(&resolve(&left, item), op, &resolve(&right, item)))
    }
    Condition::All { conditions } => {
      let compiled: Vec<Predicate> = conditions.iter().map(compile_node).collect();
      Arc::new(move |item| compiled.iter().all(|p| p(item)))
    }
    Condition::Any { conditions } => {
      let compiled: Vec<Predicate> = conditions.iter().map(compile_node).collect();
      Arc::new(move |item| compiled.iter().any(|p| p(item)))
    }
    Condition::Not { condition } => {
      let inner = compile_node(condition);
      Arc::new(move |item| !inner(item))
    }
    Condition::Exists { path } => {
      let path = path.clone();
      Arc::new(move |item| path.get(item).is_some_and(|v| !v.is_null()))
    }
  }
}

fn resolve(operand: &Operand, item: &serde_json::Value) -> Option<serde_json::Value> {
  match operand {
    Operand::Item => Some(item.clone()),
    Operand::Path { path } => path.get(item),
    Operand::Literal { value } => Some(value.clone()),
  }
}

/// Compare two resolved operands.
///
/// A missing operand (unresolvable path) fails every comparison except
/// `Ne`, which is the negation of `Eq`.
fn compare(
  left: &Option<serde_json::Value>,
  op: CompareOp,
  right: &Option<serde_json::Value>,
) -> bool {
  let (Some(left), Some(right)) = (left, right) else {
    return matches!(op, CompareOp::Ne) && left != right;
  };

  match op {
    CompareOp::Eq => loose_eq(left, right),
    CompareOp::Ne => !loose_eq(left, right),
    CompareOp::Gt => ordering(left, right).is_some_and(|o| o.is_gt()),
    CompareOp::Ge => ordering(left, right).is_some_and(|o| o.is_ge()),
    CompareOp::Lt => ordering(left, right).is_some_and(|o| o.is_lt()),
    CompareOp::Le => ordering(left, right).is_some_and(|o| o.is_le()),
    CompareOp::Contains => match (left, right) {
      (serde_json::Value::Array(items), needle) => items.iter().any(|i| loose_eq(i, needle)),
      (serde_json::Value::String(s), serde_json::Value::String(needle)) => s.contains(needle),
      _ => false,
    },
    CompareOp::StartsWith => match (left, right) {
      (serde_json::Value::String(s), serde_json::Value::String(prefix)) => s.starts_with(prefix),
      _ => false,
    },
  }
}

/// Equality that treats integer and float representations of the same
/// number as equal.
fn loose_eq(left: &serde_json::Value, right: &serde_json::Value) -> bool {
  match (left.as_f64(), right.as_f64()) {
    (Some(l), Some(r)) if left.is_number() && right.is_number() => l == r,
    _ => left == right,
  }
}

fn ordering(left: &serde_json::Value, right: &serde_json::Value) -> Option<std::cmp::Ordering> {
  match (left, right) {
    (serde_json::Value::Number(_), serde_json::Value::Number(_)) => {
      left.as_f64()?.partial_cmp(&right.as_f64()?)
    }
    (serde_json::Value::String(l), serde_json::Value::String(r)) => Some(l.cmp(r)),
    _ => None,
  }
}
