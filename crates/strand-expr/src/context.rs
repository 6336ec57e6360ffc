use serde_json::{Map, Value};

/// Values visible to an expression.
///
/// Exposed to templates as `inputs`, `value` and `runtime`. Every entry of
/// `globals` is also visible at the top level, but cannot shadow those three.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
  pub inputs: Map<String, Value>,
  pub value: Value,
  pub runtime: Option<Value>,
  pub globals: Map<String, Value>,
}

impl EvalContext {
  pub fn new(inputs: Map<String, Value>) -> Self {
    Self {
      inputs,
      ..Default::default()
    }
  }

  pub fn with_value(mut self, value: Value) -> Self {
    self.value = value;
    self
  }

  pub fn with_runtime(mut self, runtime: Value) -> Self {
    self.runtime = Some(runtime);
    self
  }

  pub fn with_globals(mut self, globals: Map<String, Value>) -> Self {
    self.globals = globals;
    self
  }

  /// Flatten into the single object handed to the template engine.
  pub fn to_value(&self) -> Value {
    let mut root = self.globals.clone();
    root.insert("inputs".to_string(), Value::Object(self.inputs.clone()));
    root.insert("value".to_string(), self.value.clone());
    root.insert(
      "runtime".to_string(),
      self.runtime.clone().unwrap_or(Value::Null),
    );
    Value::Object(root)
  }
}
