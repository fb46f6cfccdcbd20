//! Shape handling for translation payloads.
//!
//! A payload is a bare string, a list of strings, or a keyed map whose values
//! are strings or lists. [`flatten`] turns it into addressable [`WorkItem`]s and
//! [`OutputAccumulator`] collects per-item results back into the same shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{HonyakuError, Result};

/// Key used for bare-string and list payloads.
pub const SYNTHETIC_KEY: &str = "0";

/// Structure of the request input, captured once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Text(String),
    List(Vec<String>),
    Keyed(BTreeMap<String, ShapeValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeValue {
    Text(String),
    List(Vec<String>),
    /// Anything that is neither a string nor an array. Contributes no work.
    Other,
}

impl Shape {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Array(items) => Ok(Self::List(strings_only(items))),
            Value::Object(map) => {
                let keyed = map
                    .into_iter()
                    .map(|(key, value)| {
                        let value = match value {
                            Value::String(text) => ShapeValue::Text(text),
                            Value::Array(items) => ShapeValue::List(strings_only(items)),
                            other => {
                                warn!("Ignoring value of key '{}': expected string or array, got {}", key, other);
                                ShapeValue::Other
                            }
                        };
                        (key, value)
                    })
                    .collect();
                Ok(Self::Keyed(keyed))
            }
            Value::Null => Err(HonyakuError::InvalidParameter("No texts provided".to_string())),
            other => Err(HonyakuError::InvalidParameter(format!(
                "Unsupported input type: expected string, array or object, got {}",
                other
            ))),
        }
    }
}

fn strings_only(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text),
            _ => None,
        })
        .collect()
}

/// One leaf string addressed by `(key, ordinal)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: String,
    pub text: String,
    pub ordinal: usize,
}

impl WorkItem {
    fn new(key: &str, text: &str, ordinal: usize) -> Self {
        Self {
            key: key.to_string(),
            text: text.to_string(),
            ordinal,
        }
    }
}

/// Flatten a shape into work items, in key order then list order.
pub fn flatten(shape: &Shape) -> Vec<WorkItem> {
    match shape {
        Shape::Text(text) => vec![WorkItem::new(SYNTHETIC_KEY, text, 0)],
        Shape::List(texts) => texts
            .iter()
            .enumerate()
            .map(|(ordinal, text)| WorkItem::new(SYNTHETIC_KEY, text, ordinal))
            .collect(),
        Shape::Keyed(map) => map
            .iter()
            .flat_map(|(key, value)| match value {
                ShapeValue::Text(text) => vec![WorkItem::new(key, text, 0)],
                ShapeValue::List(texts) => texts
                    .iter()
                    .enumerate()
                    .map(|(ordinal, text)| WorkItem::new(key, text, ordinal))
                    .collect(),
                ShapeValue::Other => Vec::new(),
            })
            .collect(),
    }
}

/// How list positions are laid out in the finished output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrdering {
    /// Completion order of the translations.
    #[default]
    Arrival,
    /// Order of the original input list.
    Input,
}

/// A list entry tagged with its input position.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    ordinal: usize,
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyedSlot {
    Text(String),
    List(Vec<Slot>),
}

/// In-progress output, congruent with the request shape.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputAccumulator {
    Text(String),
    List(Vec<Slot>),
    Keyed(BTreeMap<String, KeyedSlot>),
}

impl OutputAccumulator {
    /// Empty string, empty list, or a map of empty values matching each key.
    pub fn empty_for(shape: &Shape) -> Self {
        match shape {
            Shape::Text(_) => Self::Text(String::new()),
            Shape::List(_) => Self::List(Vec::new()),
            Shape::Keyed(map) => Self::Keyed(
                map.iter()
                    .map(|(key, value)| {
                        let slot = match value {
                            ShapeValue::List(_) => KeyedSlot::List(Vec::new()),
                            ShapeValue::Text(_) | ShapeValue::Other => KeyedSlot::Text(String::new()),
                        };
                        (key.clone(), slot)
                    })
                    .collect(),
            ),
        }
    }

    /// Replace scalar positions, append to list positions.
    pub fn write(&mut self, item: &WorkItem, translated: String) {
        match self {
            Self::Text(text) => *text = translated,
            Self::List(slots) => slots.push(Slot {
                ordinal: item.ordinal,
                text: translated,
            }),
            Self::Keyed(map) => match map.get_mut(&item.key) {
                Some(KeyedSlot::Text(text)) => *text = translated,
                Some(KeyedSlot::List(slots)) => slots.push(Slot {
                    ordinal: item.ordinal,
                    text: translated,
                }),
                None => warn!("Dropping result for unknown key '{}'", item.key),
            },
        }
    }

    pub fn into_texts(self, ordering: ListOrdering) -> TranslatedTexts {
        match self {
            Self::Text(text) => TranslatedTexts::Text(text),
            Self::List(slots) => TranslatedTexts::List(finish_list(slots, ordering)),
            Self::Keyed(map) => TranslatedTexts::Keyed(
                map.into_iter()
                    .map(|(key, slot)| {
                        let value = match slot {
                            KeyedSlot::Text(text) => KeyedTexts::Text(text),
                            KeyedSlot::List(slots) => KeyedTexts::List(finish_list(slots, ordering)),
                        };
                        (key, value)
                    })
                    .collect(),
            ),
        }
    }
}

fn finish_list(mut slots: Vec<Slot>, ordering: ListOrdering) -> Vec<String> {
    if ordering == ListOrdering::Input {
        slots.sort_by_key(|slot| slot.ordinal);
    }
    slots.into_iter().map(|slot| slot.text).collect()
}

/// Finished output. Serialises to a bare string, an array, or an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranslatedTexts {
    Text(String),
    List(Vec<String>),
    Keyed(BTreeMap<String, KeyedTexts>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyedTexts {
    Text(String),
    List(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape(value: Value) -> Shape {
        Shape::from_value(value).unwrap()
    }

    #[test]
    fn test_bare_string_uses_synthetic_key() {
        let items = flatten(&shape(json!("hello")));
        assert_eq!(items, vec![WorkItem::new(SYNTHETIC_KEY, "hello", 0)]);
    }

    #[test]
    fn test_list_drops_non_strings() {
        let items = flatten(&shape(json!(["a", 1, "b", null])));
        let texts: Vec<_> = items.iter().map(|i| (i.key.as_str(), i.text.as_str(), i.ordinal)).collect();
        assert_eq!(texts, vec![("0", "a", 0), ("0", "b", 1)]);
    }

    #[test]
    fn test_keyed_values_fail_open() {
        let shape = shape(json!({
            "title": "Hello",
            "lines": ["one", "two"],
            "count": 3,
        }));
        let items = flatten(&shape);
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.key != "count"));

        let output = OutputAccumulator::empty_for(&shape).into_texts(ListOrdering::Arrival);
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({ "count": "", "lines": [], "title": "" })
        );
    }

    #[test]
    fn test_rejects_missing_and_scalar_input() {
        assert_eq!(Shape::from_value(Value::Null).unwrap_err().code(), "INVALID_PARAMETER");
        assert_eq!(Shape::from_value(json!(42)).unwrap_err().code(), "INVALID_PARAMETER");
        assert_eq!(Shape::from_value(json!(true)).unwrap_err().code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_empty_output_is_congruent() {
        let cases = vec![
            (json!("x"), json!("")),
            (json!(["x", "y"]), json!([])),
            (json!({ "a": "x", "b": ["y"] }), json!({ "a": "", "b": [] })),
        ];
        for (input, expected) in cases {
            let output = OutputAccumulator::empty_for(&shape(input)).into_texts(ListOrdering::Arrival);
            assert_eq!(serde_json::to_value(output).unwrap(), expected);
        }
    }

    #[test]
    fn test_out_of_order_writes_fill_every_position() {
        let shape = shape(json!({ "a": "x", "b": ["p", "q", "r"] }));
        let items = flatten(&shape);
        let mut output = OutputAccumulator::empty_for(&shape);
        for item in items.iter().rev() {
            output.write(item, item.text.to_uppercase());
        }

        let TranslatedTexts::Keyed(map) = output.into_texts(ListOrdering::Arrival) else {
            panic!("expected keyed output");
        };
        assert_eq!(map["a"], KeyedTexts::Text("X".to_string()));
        let KeyedTexts::List(list) = &map["b"] else {
            panic!("expected list under b");
        };
        let mut sorted = list.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["P", "Q", "R"]);
    }

    #[test]
    fn test_input_ordering_restores_positions() {
        let shape = shape(json!(["p", "q", "r"]));
        let mut output = OutputAccumulator::empty_for(&shape);
        for item in flatten(&shape).iter().rev() {
            output.write(item, item.text.to_uppercase());
        }

        let arrival = output.clone().into_texts(ListOrdering::Arrival);
        assert_eq!(arrival, TranslatedTexts::List(vec!["R".into(), "Q".into(), "P".into()]));

        let input = output.into_texts(ListOrdering::Input);
        assert_eq!(input, TranslatedTexts::List(vec!["P".into(), "Q".into(), "R".into()]));
    }
}
