//! Category linking: one extracted item → up to three taxonomy categories
//!
//! Candidates come from fuzzy search over the item's names, widened with
//! decayed-score ancestors so a broad category can win when only a narrow
//! descendant matched lexically. The inference service then picks from that
//! fixed set; anything it returns outside the set is discarded.

use super::inference_client::{ChatRequest, InferenceService};
use super::item_extractor::clamp01;
use super::prompts::RERANK_SYSTEM_PROMPT;
use crate::error::{ClassifyError, ClassifyResult};
use crate::models::{ExtractedItem, ItemLinkResult, LinkedCategory};
use crate::taxonomy::{diversify_by_level, CategoryCandidate, DiversifyOptions, TaxonomyIndex};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Candidates requested per search and kept after each diversification
pub const CANDIDATE_LIMIT: usize = 30;

/// Per-level cap during diversification
pub const MAX_PER_LEVEL: usize = 6;

/// Score multiplier applied per hop when adding ancestors
pub const ANCESTOR_DECAY: f64 = 0.85;

/// Categories kept per item
pub const MAX_TOP_K: usize = 3;

const MAX_PACKED_PARENTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackedParent {
    pub id: String,
    pub label: String,
}

/// Candidate as presented to the reranker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackedCandidate {
    pub id: String,
    pub label: String,
    pub level: u32,
    pub parents: Vec<PackedParent>,
    /// Lexical score scaled to [0, 1]
    pub retrieval_score: f64,
}

#[derive(Debug, Serialize)]
struct RerankItem<'a> {
    #[serde(rename = "type")]
    item_type: &'a str,
    normalized: &'a str,
    normalized_en: Option<&'a str>,
    modifiers: &'a [String],
}

#[derive(Debug, Serialize)]
struct RerankPayload<'a> {
    item: RerankItem<'a>,
    meal_text: &'a str,
    candidates: &'a [PackedCandidate],
}

/// Validated rerank decision
#[derive(Debug, Clone, PartialEq)]
pub struct RerankDecision {
    pub top: Vec<LinkedCategory>,
    pub abstain: bool,
    pub abstain_reason: Option<String>,
}

/// Link result plus the model that ranked it
#[derive(Debug, Clone, PartialEq)]
pub struct Linking {
    pub result: ItemLinkResult,
    pub model: String,
}

pub struct CategoryLinker {
    index: Arc<TaxonomyIndex>,
    service: Arc<dyn InferenceService>,
    model: String,
    options: DiversifyOptions,
}

impl CategoryLinker {
    pub fn new(
        index: Arc<TaxonomyIndex>,
        service: Arc<dyn InferenceService>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            index,
            service,
            model: model.into(),
            options: DiversifyOptions {
                limit: CANDIDATE_LIMIT,
                max_per_level: MAX_PER_LEVEL,
                prefer_broader: true,
                always_include_best: true,
            },
        }
    }

    pub fn index(&self) -> &TaxonomyIndex {
        &self.index
    }

    /// Rank categories for one item
    pub async fn link(
        &self,
        item: &ExtractedItem,
        notes_text: &str,
        lang: &str,
    ) -> ClassifyResult<Linking> {
        let candidates = self.build_candidates(item);
        let packed = pack_candidates(&self.index, &candidates, lang);

        let payload = RerankPayload {
            item: RerankItem {
                item_type: item.item_type.as_str(),
                normalized: &item.normalized_primary,
                normalized_en: item.normalized_secondary.as_deref(),
                modifiers: &item.modifiers,
            },
            meal_text: notes_text,
            candidates: &packed,
        };
        let user = serde_json::to_string(&payload)
            .map_err(|e| ClassifyError::Contract(format!("cannot encode rerank request: {}", e)))?;

        let request = ChatRequest {
            model: self.model.clone(),
            system: RERANK_SYSTEM_PROMPT.to_string(),
            user,
        };
        let reply = self.service.chat_json(&request).await?;
        let decision = parse_rerank(&reply.value, &candidates, &self.index, lang)?;

        debug!(
            item = %item.normalized_primary,
            candidates = candidates.len(),
            kept = decision.top.len(),
            abstain = decision.abstain,
            "Item linked"
        );

        Ok(Linking {
            result: ItemLinkResult::new(
                item.clone(),
                decision.top,
                decision.abstain,
                decision.abstain_reason,
            ),
            model: reply.model,
        })
    }

    /// Candidate set presented to the reranker for `item`
    pub fn build_candidates(&self, item: &ExtractedItem) -> Vec<CategoryCandidate> {
        let mut merged: HashMap<String, CategoryCandidate> = HashMap::new();
        for query in item.search_queries() {
            for candidate in self.index.search(&query, self.options.limit) {
                match merged.get(&candidate.category_id) {
                    Some(prev) if prev.lexical_score >= candidate.lexical_score => {}
                    _ => {
                        merged.insert(candidate.category_id.clone(), candidate);
                    }
                }
            }
        }

        let lexical: Vec<CategoryCandidate> = merged.into_values().collect();
        let first = diversify_by_level(&lexical, self.options);
        let Some(best) = first.first().cloned() else {
            return Vec::new();
        };

        let expanded = self.expand_ancestors(&first);
        let mut second = diversify_by_level(&expanded, self.options);

        if !second.iter().any(|c| c.category_id == best.category_id) {
            second.insert(0, best);
            second.truncate(self.options.limit);
        }
        second
    }

    fn expand_ancestors(&self, lexical: &[CategoryCandidate]) -> Vec<CategoryCandidate> {
        let lexical_ids: HashSet<&str> = lexical.iter().map(|c| c.category_id.as_str()).collect();
        let mut inferred: HashMap<&str, u8> = HashMap::new();

        for candidate in lexical {
            for (ancestor, hops) in self.index.ancestors(&candidate.category_id) {
                if lexical_ids.contains(ancestor) {
                    continue;
                }
                let score = decayed_score(candidate.lexical_score, hops);
                let entry = inferred.entry(ancestor).or_insert(0);
                if score > *entry {
                    *entry = score;
                }
            }
        }

        let mut out: Vec<CategoryCandidate> = lexical.to_vec();
        let mut added: Vec<(&str, u8)> = inferred.into_iter().collect();
        added.sort_unstable();
        out.extend(
            added
                .into_iter()
                .filter_map(|(id, score)| self.index.candidate_for(id, score)),
        );
        out
    }
}

/// Score after `hops` decay steps, floored at each step
pub fn decayed_score(score: u8, hops: u32) -> u8 {
    (0..hops).fold(score, |s, _| (f64::from(s) * ANCESTOR_DECAY).floor() as u8)
}

/// Candidate list in the shape the reranker sees
pub fn pack_candidates(
    index: &TaxonomyIndex,
    candidates: &[CategoryCandidate],
    lang: &str,
) -> Vec<PackedCandidate> {
    candidates
        .iter()
        .map(|c| PackedCandidate {
            id: c.category_id.clone(),
            label: index.get_label(&c.category_id, lang).to_string(),
            level: c.level,
            parents: c
                .parent_ids
                .iter()
                .take(MAX_PACKED_PARENTS)
                .map(|p| PackedParent {
                    id: p.clone(),
                    label: index.get_label(p, lang).to_string(),
                })
                .collect(),
            retrieval_score: f64::from(c.lexical_score) / 100.0,
        })
        .collect()
}

/// Validate a rerank reply against the presented candidates.
///
/// Ids outside the candidate set and repeated ids are dropped silently;
/// the first three survivors are kept with scores clamped to [0, 1].
pub fn parse_rerank(
    value: &Value,
    candidates: &[CategoryCandidate],
    index: &TaxonomyIndex,
    lang: &str,
) -> ClassifyResult<RerankDecision> {
    let Some(obj) = value.as_object() else {
        return Err(ClassifyError::Contract(
            "rerank reply must be a JSON object".to_string(),
        ));
    };

    let entries: &[Value] = match obj.get("top_k") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ClassifyError::Contract(
                "rerank reply 'top_k' must be an array".to_string(),
            ))
        }
    };

    let abstain = obj.get("abstain").and_then(Value::as_bool).unwrap_or(false);
    let abstain_reason = match obj.get("abstain_reason") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };

    let allowed: HashSet<&str> = candidates.iter().map(|c| c.category_id.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut top = Vec::new();

    for entry in entries {
        let Some(fields) = entry.as_object() else {
            continue;
        };
        let id = match fields.get("id") {
            Some(Value::String(s)) => s.trim(),
            _ => continue,
        };
        if id.is_empty() {
            continue;
        }
        if !allowed.contains(id) {
            debug!(category_id = id, "Dropping category outside candidate set");
            continue;
        }
        if !seen.insert(id.to_string()) {
            continue;
        }

        top.push(LinkedCategory {
            category_id: id.to_string(),
            label: index.get_label(id, lang).to_string(),
            score: clamp01(fields.get("score").unwrap_or(&Value::Null), 0.0),
            level: index.get_level(id),
        });
        if top.len() == MAX_TOP_K {
            break;
        }
    }

    Ok(RerankDecision {
        top,
        abstain,
        abstain_reason,
    })
}
