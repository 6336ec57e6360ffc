use serde::{Deserialize, Serialize};

/// Requirements that apply to a process and, by inheritance, to every process
/// embedded below it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
  /// Resource minimums and maximums for leaf tools.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resources: Option<ResourceRequirement>,

  /// Constants made available to every expression evaluated under this process.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub globals: serde_json::Map<String, serde_json::Value>,
}

impl Requirements {
  /// Fill anything unset here from an enclosing scope.
  ///
  /// Values set on `self` always win; globals are merged key by key.
  pub fn inherit(&self, parent: &Requirements) -> Requirements {
    let mut globals = parent.globals.clone();
    for (key, value) in &self.globals {
      globals.insert(key.clone(), value.clone());
    }

    Requirements {
      resources: self.resources.clone().or_else(|| parent.resources.clone()),
      globals,
    }
  }
}

/// A single resource bound: a literal number or an expression evaluated once
/// concrete inputs are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceValue {
  Fixed(f64),
  Expression(String),
}

impl ResourceValue {
  /// Whether the value can only be known at run time.
  pub fn is_dynamic(&self) -> bool {
    match self {
      ResourceValue::Fixed(_) => false,
      ResourceValue::Expression(expr) => expr.contains("{{") || expr.contains("{%"),
    }
  }
}

/// Resource requirement fields for a leaf tool.
///
/// Cores are a count, every other field is in MiB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cores_min: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cores_max: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ram_min: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ram_max: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tmpdir_min: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tmpdir_max: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outdir_min: Option<ResourceValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub outdir_max: Option<ResourceValue>,
}

impl ResourceRequirement {
  /// All fields with their names, in declaration order.
  pub fn fields(&self) -> [(&'static str, Option<&ResourceValue>); 8] {
    [
      ("cores_min", self.cores_min.as_ref()),
      ("cores_max", self.cores_max.as_ref()),
      ("ram_min", self.ram_min.as_ref()),
      ("ram_max", self.ram_max.as_ref()),
      ("tmpdir_min", self.tmpdir_min.as_ref()),
      ("tmpdir_max", self.tmpdir_max.as_ref()),
      ("outdir_min", self.outdir_min.as_ref()),
      ("outdir_max", self.outdir_max.as_ref()),
    ]
  }

  /// Whether any field is an unevaluated expression.
  pub fn is_dynamic(&self) -> bool {
    self
      .fields()
      .iter()
      .any(|(_, value)| value.is_some_and(ResourceValue::is_dynamic))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resource_value_deserialize() {
    let req: ResourceRequirement = serde_json::from_str(
      r#"{ "cores_min": 2, "ram_min": "{{ inputs.size * 2 }}", "outdir_max": "512" }"#,
    )
    .unwrap();

    assert_eq!(req.cores_min, Some(ResourceValue::Fixed(2.0)));
    assert!(req.ram_min.as_ref().unwrap().is_dynamic());
    assert!(!req.outdir_max.as_ref().unwrap().is_dynamic());
    assert!(req.is_dynamic());
  }

  #[test]
  fn test_literal_only_is_not_dynamic() {
    let req = ResourceRequirement {
      cores_min: Some(ResourceValue::Fixed(4.0)),
      ram_max: Some(ResourceValue::Fixed(2048.0)),
      ..Default::default()
    };
    assert!(!req.is_dynamic());
  }

  #[test]
  fn test_inherit_prefers_own_values() {
    let parent = Requirements {
      resources: Some(ResourceRequirement {
        cores_min: Some(ResourceValue::Fixed(8.0)),
        ..Default::default()
      }),
      globals: serde_json::json!({ "a": 1, "b": 2 })
        .as_object()
        .cloned()
        .unwrap(),
    };
    let child = Requirements {
      resources: None,
      globals: serde_json::json!({ "b": 3 }).as_object().cloned().unwrap(),
    };

    let merged = child.inherit(&parent);
    assert_eq!(merged.resources, parent.resources);
    assert_eq!(merged.globals["a"], 1);
    assert_eq!(merged.globals["b"], 3);
  }
}
