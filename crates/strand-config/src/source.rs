use serde::{Deserialize, Serialize};

/// A field that accepts either a single value or a list of values.
///
/// Step input sources, workflow output sources and scatter keys are written
/// either way in documents:
///
/// ```json
/// { "source": "step/out" }
/// { "source": ["a/out", "b/out"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  /// View the value(s) as a slice.
  pub fn as_slice(&self) -> &[T] {
    match self {
      OneOrMany::One(value) => std::slice::from_ref(value),
      OneOrMany::Many(values) => values.as_slice(),
    }
  }

  /// Whether the field was written as a list (even a one-element list).
  pub fn is_many(&self) -> bool {
    matches!(self, OneOrMany::Many(_))
  }

  pub fn len(&self) -> usize {
    self.as_slice().len()
  }

  pub fn is_empty(&self) -> bool {
    self.as_slice().is_empty()
  }
}

impl<T> From<T> for OneOrMany<T> {
  fn from(value: T) -> Self {
    OneOrMany::One(value)
  }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
  fn from(values: Vec<T>) -> Self {
    OneOrMany::Many(values)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_one_or_many_deserialize() {
    let one: OneOrMany<String> = serde_json::from_str(r#""a/out""#).unwrap();
    assert_eq!(one.as_slice(), ["a/out".to_string()]);
    assert!(!one.is_many());

    let many: OneOrMany<String> = serde_json::from_str(r#"["a/out", "b/out"]"#).unwrap();
    assert_eq!(many.len(), 2);
    assert!(many.is_many());
  }
}
