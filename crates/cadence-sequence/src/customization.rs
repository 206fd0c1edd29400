//! Caller-supplied redirection rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Redirection/override rules merged into nested or forked executions.
///
/// When a nested-sequence-call stage launches sequence `A` and the
/// active customization redirects `A -> B`, the engine resolves and
/// runs `B` instead. Stage-scoped rules win over ambient rules carried
/// by the calling thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customization {
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub redirects: HashMap<String, String>,
}

impl Customization {
  /// True when no rules are configured.
  pub fn is_empty(&self) -> bool {
    self.redirects.is_empty()
  }

  /// Merge `self` over an ambient customization; rules in `self` win.
  pub fn merged_over(&self, ambient: &Customization) -> Customization {
    let mut redirects = ambient.redirects.clone();
    redirects.extend(self.redirects.clone());
    Customization { redirects }
  }

  /// Resolve a sequence id through the redirect rules.
  pub fn resolve<'a>(&'a self, sequence_id: &'a str) -> &'a str {
    self
      .redirects
      .get(sequence_id)
      .map(String::as_str)
      .unwrap_or(sequence_id)
  }
}
