//! Item extraction: meal text → validated, deduplicated food items

use super::inference_client::{ChatRequest, InferenceService};
use super::prompts::{extract_user_message, EXTRACT_SYSTEM_PROMPT};
use crate::error::{ClassifyError, ClassifyResult};
use crate::models::{ExtractedItem, ItemType};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Confidence used when the service omits it or sends garbage
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Item entry as sent by the service; every field is checked by hand
#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default)]
    text_span: Value,
    #[serde(default, alias = "normalized_ru", alias = "normalized")]
    normalized_primary: Value,
    #[serde(default, alias = "normalized_en")]
    normalized_secondary: Value,
    #[serde(default, rename = "type")]
    item_type: Value,
    #[serde(default)]
    modifiers: Value,
    #[serde(default)]
    confidence: Value,
}

/// Items plus the model that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub items: Vec<ExtractedItem>,
    pub model: String,
}

pub struct ItemExtractor {
    service: Arc<dyn InferenceService>,
    model: String,
}

impl ItemExtractor {
    pub fn new(service: Arc<dyn InferenceService>, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    /// One extraction call; any failure means no items
    pub async fn extract(&self, notes_text: &str, lang: &str) -> ClassifyResult<Extraction> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: EXTRACT_SYSTEM_PROMPT.to_string(),
            user: extract_user_message(lang, notes_text),
        };

        let reply = self.service.chat_json(&request).await?;
        let items = parse_extraction(&reply.value)?;

        debug!(items = items.len(), model = %reply.model, "Extraction parsed");

        Ok(Extraction {
            items,
            model: reply.model,
        })
    }
}

/// Validate an extraction reply.
///
/// The reply must be an object; `items`, when present, must be an array.
/// Individual bad entries are dropped, never fatal.
pub fn parse_extraction(value: &Value) -> ClassifyResult<Vec<ExtractedItem>> {
    let Some(obj) = value.as_object() else {
        return Err(ClassifyError::Contract(
            "extraction reply must be a JSON object".to_string(),
        ));
    };

    let raw_items = match obj.get("items") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ClassifyError::Contract(
                "extraction reply 'items' must be an array".to_string(),
            ))
        }
    };

    let parsed = raw_items.iter().filter_map(parse_item).collect();
    Ok(dedup_items(parsed))
}

fn parse_item(value: &Value) -> Option<ExtractedItem> {
    if !value.is_object() {
        return None;
    }
    let raw: RawItem = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Dropping unreadable item");
            return None;
        }
    };

    let item_type: ItemType = raw.item_type.as_str()?.parse().ok()?;

    let text_span = scalar_text(&raw.text_span);
    let primary = scalar_text(&raw.normalized_primary);
    if primary.is_empty() && text_span.is_empty() {
        return None;
    }

    let secondary = match &raw.normalized_secondary {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };

    Some(ExtractedItem {
        item_type,
        normalized_primary: if primary.is_empty() {
            text_span.clone()
        } else {
            primary
        },
        text_span,
        normalized_secondary: secondary,
        modifiers: string_list(&raw.modifiers),
        confidence: clamp01(&raw.confidence, DEFAULT_CONFIDENCE),
    })
}

/// Merge items with the same (type, lowercase name), keeping the more
/// confident one at the position where the key first appeared
pub fn dedup_items(items: Vec<ExtractedItem>) -> Vec<ExtractedItem> {
    let mut out: Vec<ExtractedItem> = Vec::with_capacity(items.len());
    let mut slot_by_key: HashMap<(ItemType, String), usize> = HashMap::new();

    for item in items {
        match slot_by_key.get(&item.dedup_key()) {
            Some(&slot) => {
                if item.confidence > out[slot].confidence {
                    out[slot] = item;
                }
            }
            None => {
                slot_by_key.insert(item.dedup_key(), out.len());
                out.push(item);
            }
        }
    }

    out
}

/// Coerce a JSON value to a number in [0, 1]
pub fn clamp01(value: &Value, default: f64) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match parsed {
        Some(v) if !v.is_nan() => v.clamp(0.0, 1.0),
        _ => default,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
