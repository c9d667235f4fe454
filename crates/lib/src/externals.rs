//! External dependency tracking.

use std::collections::BTreeSet;

/// Module identifiers discovered during the primary build phase that are not
/// bundled inline and must be packaged by the module bundler.
///
/// The set only grows; the module phase reads it once the primary phase has
/// finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalDependencySet(BTreeSet<String>);

impl ExternalDependencySet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add an identifier. Returns `false` if it was already present.
  pub fn insert(&mut self, id: impl Into<String>) -> bool {
    self.0.insert(id.into())
  }

  pub fn extend<I, S>(&mut self, ids: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    for id in ids {
      self.insert(id);
    }
  }

  pub fn contains(&self, id: &str) -> bool {
    self.0.contains(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn to_vec(&self) -> Vec<String> {
    self.0.iter().cloned().collect()
  }
}

impl<S: Into<String>> FromIterator<S> for ExternalDependencySet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut set = Self::new();
    set.extend(iter);
    set
  }
}
