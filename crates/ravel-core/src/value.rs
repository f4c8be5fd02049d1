use crate::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved state-variable value.
///
/// `Invalid` is the documented error marker: variables caught in an unresolvable cycle, or whose
/// definitions could not make sense of their inputs, resolve to it. `Number(f64::NAN)` is the
/// neutral numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum StateValue {
    Invalid,
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<StateValue>),
    Node(NodeId),
}

impl StateValue {
    pub fn nan() -> Self {
        Self::Number(f64::NAN)
    }

    pub fn point(coords: &[f64]) -> Self {
        Self::List(coords.iter().copied().map(Self::Number).collect())
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Numeric view with NaN as the fallback.
    pub fn to_f64(&self) -> f64 {
        self.as_f64().unwrap_or(f64::NAN)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) if !n.is_nan() => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Interprets the value as a numeric tuple (`List` of numbers). Non-numeric entries map to NaN.
    pub fn as_point(&self) -> Option<Vec<f64>> {
        self.as_list()
            .map(|items| items.iter().map(StateValue::to_f64).collect())
    }

    /// Display text used by text-like consumers.
    pub fn to_text(&self) -> String {
        match self {
            Self::Invalid => "\u{FFFD}".to_string(),
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(StateValue::to_text).collect();
                format!("({})", parts.join(", "))
            }
            Self::Node(id) => format!("#{}", id.0),
        }
    }

    /// Converts to plain JSON for renderers. NaN and infinities become `null`; `Invalid` becomes
    /// `{"invalid": true}` so consumers can tell it apart from an absent value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Invalid => serde_json::json!({ "invalid": true }),
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(StateValue::to_json).collect()),
            Self::Node(id) => serde_json::json!({ "node": id.0 }),
        }
    }

    /// Best-effort conversion from plain JSON, used for attribute literals and action payloads.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(obj) => {
                if obj.get("invalid").and_then(Value::as_bool) == Some(true) {
                    return Self::Invalid;
                }
                match obj.get("node").and_then(Value::as_u64) {
                    Some(id) => u32::try_from(id)
                        .map(|id| Self::Node(NodeId(id)))
                        .unwrap_or(Self::Invalid),
                    None => Self::Invalid,
                }
            }
        }
    }

    /// Equality where numbers compare within `tolerance` and NaN equals NaN.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                (a.is_nan() && b.is_nan()) || (a - b).abs() <= tolerance || a == b
            }
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y, tolerance))
            }
            _ => self == other,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "∞" } else { "-∞" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NodeId> for StateValue {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(value: Vec<StateValue>) -> Self {
        Self::List(value)
    }
}
