//! Dotted-path accessors over JSON values.
//!
//! An accessor is a pre-parsed path like `order.items[2].sku`. Stages
//! use accessors to project payloads out of their input and to splice
//! results back into a carried object. Accessors serialize as their
//! string form so definitions stay readable.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DefinitionError;

/// One step of an accessor path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Object member access.
  Key(String),
  /// Array element access.
  Index(usize),
}

/// A parsed accessor path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
  segments: Vec<Segment>,
}

impl Accessor {
  /// Parse a path string like `a.b[0].c`.
  ///
  /// A path may begin with an index (`[0].sku`) to address an element
  /// of a top-level array.
  pub fn parse(path: &str) -> Result<Self, DefinitionError> {
    let parse_err = |message: &str| DefinitionError::AccessorParse {
      path: path.to_string(),
      message: message.to_string(),
    };

    if path.is_empty() {
      return Err(parse_err("path is empty"));
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
      if part.is_empty() {
        return Err(parse_err("empty path segment"));
      }

      // Split a trailing chain of [n] index accesses off the key.
      let (key, rest) = match part.find('[') {
        Some(pos) => part.split_at(pos),
        None => (part, ""),
      };

      if !key.is_empty() {
        segments.push(Segment::Key(key.to_string()));
      }

      let mut remainder = rest;
      while !remainder.is_empty() {
        let Some(stripped) = remainder.strip_prefix('[') else {
          return Err(parse_err("unexpected characters after index"));
        };
        let Some(close) = stripped.find(']') else {
          return Err(parse_err("unterminated index"));
        };
        let index: usize = stripped[..close]
          .parse()
          .map_err(|_| parse_err("index is not a number"))?;
        segments.push(Segment::Index(index));
        remainder = &stripped[close + 1..];
      }
    }

    Ok(Self { segments })
  }

  /// The path segments, in order.
  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// Resolve the path against a value, cloning the result.
  ///
  /// Returns `None` when any segment is missing or applied to a value
  /// of the wrong shape.
  pub fn get(&self, value: &serde_json::Value) -> Option<serde_json::Value> {
    let mut current = value;
    for segment in &self.segments {
      current = match segment {
        Segment::Key(key) => current.get(key.as_str())?,
        Segment::Index(index) => current.get(index)?,
      };
    }
    Some(current.clone())
  }

  /// Write `new` at the path, in place.
  ///
  /// Parents must already exist: a missing intermediate segment is an
  /// error, not an implicit object creation. The final segment may
  /// insert a new object key; an index must be in bounds.
  pub fn set(
    &self,
    target: &mut serde_json::Value,
    new: serde_json::Value,
  ) -> Result<(), DefinitionError> {
    let apply_err = |message: String| DefinitionError::AccessorApply {
      path: self.to_string(),
      message,
    };

    let (last, parents) = self
      .segments
      .split_last()
      .ok_or_else(|| apply_err("path is empty".to_string()))?;

    let mut current = target;
    for segment in parents {
      current = match segment {
        Segment::Key(key) => current
          .get_mut(key.as_str())
          .ok_or_else(|| apply_err(format!("missing member '{}'", key)))?,
        Segment::Index(index) => current
          .get_mut(*index)
          .ok_or_else(|| apply_err(format!("missing index {}", index)))?,
      };
    }

    match last {
      Segment::Key(key) => {
        let object = current
          .as_object_mut()
          .ok_or_else(|| apply_err(format!("'{}' is not an object member", key)))?;
        object.insert(key.clone(), new);
      }
      Segment::Index(index) => {
        let array = current
          .as_array_mut()
          .ok_or_else(|| apply_err(format!("index {} is not an array element", index)))?;
        if *index >= array.len() {
          return Err(apply_err(format!("index {} out of bounds", index)));
        }
        array[*index] = new;
      }
    }

    Ok(())
  }
}

impl fmt::Display for Accessor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for segment in &self.segments {
      match segment {
        Segment::Key(key) => {
          if !first {
            write!(f, ".")?;
          }
          write!(f, "{}", key)?;
        }
        Segment::Index(index) => write!(f, "[{}]", index)?,
      }
      first = false;
    }
    Ok(())
  }
}

impl FromStr for Accessor {
  type Err = DefinitionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Accessor::parse(s)
  }
}

impl Serialize for Accessor {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Accessor {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let path = String::deserialize(deserializer)?;
    Accessor::parse(&path).map_err(D::Error::custom)
  }
}
