//! Type descriptors for stage inputs and outputs.
//!
//! The engine dispatches on declared types rather than runtime
//! reflection, so every stage carries a [`TypeTag`] for its input and
//! output. Tags are structural: they describe the JSON shape a value
//! must have, with `Named` standing in for domain object types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A serializable type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeTag {
  /// Matches any value.
  Any,
  Null,
  Bool,
  /// A whole number (JSON number with no fractional part).
  Integer,
  /// Any JSON number.
  Number,
  String,
  /// Any JSON object.
  Object,
  /// A homogeneous collection.
  Array { element: Box<TypeTag> },
  /// A domain object type, matched structurally as an object.
  Named { name: String },
}

impl TypeTag {
  /// Convenience constructor for an array tag.
  pub fn array(element: TypeTag) -> Self {
    TypeTag::Array {
      element: Box::new(element),
    }
  }

  /// Convenience constructor for a named domain type.
  pub fn named(name: impl Into<String>) -> Self {
    TypeTag::Named { name: name.into() }
  }

  /// Check a runtime value against this tag.
  pub fn matches(&self, value: &serde_json::Value) -> bool {
    match self {
      TypeTag::Any => true,
      TypeTag::Null => value.is_null(),
      TypeTag::Bool => value.is_boolean(),
      TypeTag::Integer => value.is_i64() || value.is_u64(),
      TypeTag::Number => value.is_number(),
      TypeTag::String => value.is_string(),
      TypeTag::Object => value.is_object(),
      TypeTag::Array { element } => value
        .as_array()
        .is_some_and(|items| items.iter().all(|item| element.matches(item))),
      TypeTag::Named { .. } => value.is_object(),
    }
  }

  /// Infer the tag of a runtime value.
  ///
  /// Arrays infer their element tag when all elements agree, `Any`
  /// otherwise. Used by Select when the declared output type is `Any`.
  pub fn infer(value: &serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => TypeTag::Null,
      serde_json::Value::Bool(_) => TypeTag::Bool,
      serde_json::Value::Number(n) => {
        if n.is_i64() || n.is_u64() {
          TypeTag::Integer
        } else {
          TypeTag::Number
        }
      }
      serde_json::Value::String(_) => TypeTag::String,
      serde_json::Value::Object(_) => TypeTag::Object,
      serde_json::Value::Array(items) => {
        let mut tags = items.iter().map(TypeTag::infer);
        let element = match tags.next() {
          Some(first) if tags.all(|t| t == first) => first,
          Some(_) => TypeTag::Any,
          None => TypeTag::Any,
        };
        TypeTag::array(element)
      }
    }
  }

  /// The empty value of this tag's collection shape.
  ///
  /// Array tags (and `Any`) produce an empty JSON array; this is what
  /// Filter and Foreach short-circuit to on empty or null input.
  pub fn empty_collection(&self) -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
  }

  /// True when this tag describes a collection.
  pub fn is_collection(&self) -> bool {
    matches!(self, TypeTag::Array { .. })
  }
}

impl fmt::Display for TypeTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypeTag::Any => write!(f, "any"),
      TypeTag::Null => write!(f, "null"),
      TypeTag::Bool => write!(f, "bool"),
      TypeTag::Integer => write!(f, "integer"),
      TypeTag::Number => write!(f, "number"),
      TypeTag::String => write!(f, "string"),
      TypeTag::Object => write!(f, "object"),
      TypeTag::Array { element } => write!(f, "array<{}>", element),
      TypeTag::Named { name } => write!(f, "named<{}>", name),
    }
  }
}

/// Cache key for generic handler instantiation.
///
/// The registry builds one filter handler per concrete
/// (collection, item) pair and caches it under this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypePair {
  pub collection: TypeTag,
  pub item: TypeTag,
}

impl TypePair {
  pub fn new(collection: TypeTag, item: TypeTag) -> Self {
    Self { collection, item }
  }
}

impl fmt::Display for TypePair {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {})", self.collection, self.item)
  }
}
