use crate::{Error, Result};
use serde_json::{Map, Value, json};

/// Engine configuration, stored as a JSON object addressed by dotted paths.
///
/// [`RavelConfig::default`] carries every known key with its default; user overrides are merged on
/// top with [`RavelConfig::deep_merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct RavelConfig(Value);

impl Default for RavelConfig {
    fn default() -> Self {
        Self(json!({
            "resolution": {
                "maxDeclarationRounds": 8
            },
            "composite": {
                "trimWithheld": false
            },
            "snapshot": {
                "includeUsedDefault": false
            },
            "diagnostics": {
                "mirrorToLog": true
            },
            "inverse": {
                "tolerance": 1e-9
            }
        }))
    }
}

impl RavelConfig {
    pub fn empty_object() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Parses a JSON object of overrides and merges it onto the defaults.
    pub fn from_json_overrides(text: &str) -> Result<Self> {
        let overrides: Value = serde_json::from_str(text)?;
        if !overrides.is_object() {
            return Err(Error::InvalidConfig {
                message: "configuration overrides must be a JSON object".to_string(),
            });
        }
        let mut config = Self::default();
        config.deep_merge(&overrides);
        Ok(config)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn get(&self, dotted_path: &str) -> Option<&Value> {
        let mut cur = &self.0;
        for segment in dotted_path.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur)
    }

    pub fn get_bool(&self, dotted_path: &str) -> Option<bool> {
        self.get(dotted_path)?.as_bool()
    }

    pub fn get_u64(&self, dotted_path: &str) -> Option<u64> {
        self.get(dotted_path)?.as_u64()
    }

    pub fn get_f64(&self, dotted_path: &str) -> Option<f64> {
        self.get(dotted_path)?.as_f64()
    }

    pub fn set_value(&mut self, dotted_path: &str, value: Value) {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }

        let Value::Object(ref mut root) = self.0 else {
            return;
        };
        let mut cur: &mut Map<String, Value> = root;
        let mut segments = dotted_path.split('.').peekable();
        while let Some(seg) = segments.next() {
            if segments.peek().is_none() {
                cur.insert(seg.to_string(), value);
                return;
            }
            let slot = cur.entry(seg).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(next) = slot.as_object_mut() else {
                return;
            };
            cur = next;
        }
    }

    pub fn deep_merge(&mut self, other: &Value) {
        deep_merge_value(&mut self.0, other);
    }

    pub fn max_declaration_rounds(&self) -> usize {
        self.get_u64("resolution.maxDeclarationRounds")
            .map(|n| n.clamp(1, 64) as usize)
            .unwrap_or(8)
    }

    pub fn trim_withheld(&self) -> bool {
        self.get_bool("composite.trimWithheld").unwrap_or(false)
    }

    pub fn include_used_default(&self) -> bool {
        self.get_bool("snapshot.includeUsedDefault").unwrap_or(false)
    }

    pub fn mirror_diagnostics_to_log(&self) -> bool {
        self.get_bool("diagnostics.mirrorToLog").unwrap_or(true)
    }

    pub fn inverse_tolerance(&self) -> f64 {
        self.get_f64("inverse.tolerance").unwrap_or(1e-9)
    }
}

fn deep_merge_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(in_map)) => {
            for (key, in_value) in in_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_value(base_value, in_value),
                    None => {
                        base_map.insert(key.clone(), in_value.clone());
                    }
                }
            }
        }
        (base_slot, in_value) => {
            *base_slot = in_value.clone();
        }
    }
}
