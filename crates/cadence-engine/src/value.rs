//! The step value sentinel.

/// A stage's working value: either a JSON value or the explicit
/// "no value" sentinel.
///
/// `None` is distinct from JSON `null`: a foreach aggregation skips
/// `None` outputs but keeps `null` elements, and a nested call with
/// `prevent_return` and no original input completes with `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StepValue {
  #[default]
  None,
  Value(serde_json::Value),
}

impl StepValue {
  pub fn is_none(&self) -> bool {
    matches!(self, StepValue::None)
  }

  pub fn as_value(&self) -> Option<&serde_json::Value> {
    match self {
      StepValue::None => None,
      StepValue::Value(v) => Some(v),
    }
  }

  pub fn into_value(self) -> Option<serde_json::Value> {
    match self {
      StepValue::None => None,
      StepValue::Value(v) => Some(v),
    }
  }

  /// The value, or JSON `null` for the sentinel.
  pub fn clone_or_null(&self) -> serde_json::Value {
    match self {
      StepValue::None => serde_json::Value::Null,
      StepValue::Value(v) => v.clone(),
    }
  }
}

impl From<serde_json::Value> for StepValue {
  fn from(value: serde_json::Value) -> Self {
    StepValue::Value(value)
  }
}
