//! Static tool schemas.
//!
//! A [`ToolDescriptor`] is plain data: the name the model calls, the
//! arguments it may pass and whether running it has side effects. The
//! executable half lives in a separate [`ToolHandler`](crate::tools::ToolHandler).

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ArgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Boolean => "boolean",
            ArgKind::Array => "array",
            ArgKind::Object => "object",
        }
    }

    /// Whether a JSON value has this kind. Floats are not integers.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::Array => value.is_array(),
            ArgKind::Object => value.is_object(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolArgument {
    pub name: &'static str,
    pub kind: ArgKind,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<&'static str>>,
}

impl ToolArgument {
    pub fn required(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
            default: None,
            allowed: None,
        }
    }

    pub fn optional(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn one_of(mut self, values: &[&'static str]) -> Self {
        self.allowed = Some(values.to_vec());
        self
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.kind.matches(value) {
            return Err(format!(
                "Argument '{}' must be {}, got {}",
                self.name,
                self.kind.as_str(),
                json_kind(value)
            ));
        }
        if let Some(allowed) = &self.allowed {
            let member = value
                .as_str()
                .map(|s| allowed.contains(&s))
                .unwrap_or(false);
            if !member {
                return Err(format!(
                    "Argument '{}' must be one of: {:?}",
                    self.name, allowed
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<ToolArgument>,
    pub is_destructive: bool,
    /// Gets the extended dispatcher budget instead of the default one.
    pub long_running: bool,
}

impl ToolDescriptor {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            arguments: Vec::new(),
            is_destructive: false,
            long_running: false,
        }
    }

    pub fn arg(mut self, argument: ToolArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn destructive(mut self) -> Self {
        self.is_destructive = true;
        self
    }

    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Checks `args` against the schema and reports the first violation.
    ///
    /// A `null` value is treated as absent.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for argument in &self.arguments {
            match args.get(argument.name) {
                None | Some(Value::Null) => {
                    if argument.required {
                        return Err(format!("Missing required argument: {}", argument.name));
                    }
                }
                Some(value) => argument.check(value)?,
            }
        }
        Ok(())
    }

    /// Returns a copy of `args` with declared defaults filled in for
    /// absent optional arguments.
    pub fn with_defaults(&self, args: &Map<String, Value>) -> Map<String, Value> {
        let mut filled = args.clone();
        for argument in &self.arguments {
            let absent = matches!(filled.get(argument.name), None | Some(Value::Null));
            if let (true, Some(default)) = (absent, &argument.default) {
                filled.insert(argument.name.to_string(), default.clone());
            }
        }
        filled
    }

    /// JSON schema of the arguments object.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for argument in &self.arguments {
            let mut prop = json!({
                "type": argument.kind.as_str(),
                "description": argument.description,
            });
            if let Some(allowed) = &argument.allowed {
                prop["enum"] = json!(allowed);
            }
            if let Some(default) = &argument.default {
                prop["default"] = default.clone();
            }
            properties.insert(argument.name.to_string(), prop);
            if argument.required {
                required.push(argument.name);
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
