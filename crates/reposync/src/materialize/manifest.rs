//! Rendered manifests.

use serde_json::Value;

/// A rendered resource object, ready to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedManifest {
    object: serde_json::Map<String, Value>,
}

impl ResolvedManifest {
    /// Decodes a single rendered resource object.
    ///
    /// The object must carry `apiVersion`, `kind`, and either
    /// `metadata.name` or `metadata.generateName`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        let object = match value {
            Value::Object(object) => object,
            other => return Err(format!("expected a JSON object, got {}", type_name(&other))),
        };

        let manifest = Self { object };
        if manifest.api_version().is_empty() {
            return Err("missing apiVersion".to_string());
        }
        if manifest.kind().is_empty() {
            return Err("missing kind".to_string());
        }
        if manifest.name().is_empty() && manifest.generate_name().is_empty() {
            return Err("missing metadata.name and metadata.generateName".to_string());
        }
        Ok(manifest)
    }

    fn str_field(&self, key: &str) -> &str {
        self.object.get(key).and_then(Value::as_str).unwrap_or("")
    }

    fn metadata_field(&self, key: &str) -> &str {
        self.object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.str_field("kind")
    }

    pub fn name(&self) -> &str {
        self.metadata_field("name")
    }

    pub fn generate_name(&self) -> &str {
        self.metadata_field("generateName")
    }

    /// Explicit name, falling back to the generate-name hint.
    pub fn display_name(&self) -> &str {
        match self.name() {
            "" => self.generate_name(),
            name => name,
        }
    }

    pub fn spec(&self) -> Option<&Value> {
        self.object.get("spec")
    }

    /// The whole object.
    pub fn as_object(&self) -> &serde_json::Map<String, Value> {
        &self.object
    }

    /// Returns a copy of the object placed in `namespace`.
    pub fn with_namespace(&self, namespace: &str) -> serde_json::Map<String, Value> {
        let mut object = self.object.clone();
        let metadata = object
            .entry("metadata")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(meta) = metadata {
            meta.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
        object
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
