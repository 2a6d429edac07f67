//! Taxonomy graph index
//!
//! Built once from the category definition document and immutable
//! afterwards, so one `Arc<TaxonomyIndex>` can serve any number of
//! concurrent pipeline runs without locking.
//!
//! Nodes live in an arena (`Vec<TaxonomyNode>`) addressed by `usize`
//! handles; string ids are resolved through `by_id`. The graph is a DAG in
//! practice, but nothing here assumes it: every walk keeps a visited set.

use super::similarity::{self, ProcessedText};
use super::CategoryCandidate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Language used when the preferred label is missing
pub const FALLBACK_LANG: &str = "en";

/// Search variants kept per node (labels in all languages plus the id token)
const MAX_VARIANTS_PER_NODE: usize = 10;

/// Parent ids carried on a candidate for display
const MAX_CANDIDATE_PARENTS: usize = 3;

/// Depth bound for `ancestor_at_level`
const MAX_ROLLUP_DEPTH: usize = 30;

/// Definition-load errors (fatal at startup)
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("Failed to read taxonomy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed taxonomy JSON: {0}")]
    Parse(String),

    #[error("Unexpected taxonomy shape: {0}")]
    Shape(String),

    #[error("{count} taxonomy nodes are unreachable from any root (e.g. {sample:?})")]
    Disconnected { count: usize, sample: Vec<String> },
}

/// What to do with nodes that no root reaches (isolated cycles)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectedPolicy {
    /// Assign level 0 and keep loading
    #[default]
    LevelZero,
    /// Fail the load
    Reject,
}

impl std::str::FromStr for DisconnectedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "level_zero" | "level-zero" | "levelzero" => Ok(DisconnectedPolicy::LevelZero),
            "reject" => Ok(DisconnectedPolicy::Reject),
            other => Err(format!("unknown disconnected-node policy: {}", other)),
        }
    }
}

/// Options applied while building the index
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub disconnected: DisconnectedPolicy,
}

/// One category in the taxonomy graph
#[derive(Debug, Clone)]
pub struct TaxonomyNode {
    pub id: String,
    /// Language code → display label, never empty values
    pub labels: BTreeMap<String, String>,
    /// Parent ids as given in the source, including ids absent from the graph
    pub parent_ids: Vec<String>,
    /// Minimum hops from any root
    pub level: u32,
}

/// Definition entry as it appears in the source document
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default, alias = "name")]
    labels: Option<serde_json::Value>,
    #[serde(default, alias = "parents")]
    parent_ids: Option<serde_json::Value>,
}

/// Searchable text variant owned by one node
#[derive(Debug)]
struct SearchChoice {
    text: ProcessedText,
    node: usize,
}

/// Read-only hierarchical category index
#[derive(Debug)]
pub struct TaxonomyIndex {
    source: Option<PathBuf>,
    nodes: Vec<TaxonomyNode>,
    by_id: HashMap<String, usize>,
    /// Child handles derived from present parent links
    children: Vec<Vec<usize>>,
    /// Whether BFS from the roots reached the node
    reachable: Vec<bool>,
    choices: Vec<SearchChoice>,
}

impl TaxonomyIndex {
    /// Load and build the index from a definition file
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self, TaxonomyError> {
        let text = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut index = Self::from_json_str(&text, options)?;
        index.source = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            nodes = index.len(),
            variants = index.choices.len(),
            "Taxonomy index loaded"
        );

        Ok(index)
    }

    /// Build the index from definition JSON text
    pub fn from_json_str(text: &str, options: &LoadOptions) -> Result<Self, TaxonomyError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| TaxonomyError::Parse(e.to_string()))?;
        Self::from_value(value, options)
    }

    /// Build the index from an already-parsed definition document
    pub fn from_value(value: serde_json::Value, options: &LoadOptions) -> Result<Self, TaxonomyError> {
        let serde_json::Value::Object(entries) = value else {
            return Err(TaxonomyError::Shape(format!(
                "expected top-level object mapping id to definition, got {}",
                json_kind(&value)
            )));
        };

        let mut nodes = Vec::with_capacity(entries.len());
        for (id, payload) in entries {
            if !payload.is_object() {
                return Err(TaxonomyError::Shape(format!(
                    "definition of '{}' is {}, expected object",
                    id,
                    json_kind(&payload)
                )));
            }
            let raw: RawEntry = serde_json::from_value(payload)
                .map_err(|e| TaxonomyError::Parse(format!("entry '{}': {}", id, e)))?;

            nodes.push(TaxonomyNode {
                labels: collect_labels(raw.labels),
                parent_ids: collect_parent_ids(raw.parent_ids),
                id,
                level: 0,
            });
        }

        Self::build(nodes, options)
    }

    fn build(mut nodes: Vec<TaxonomyNode>, options: &LoadOptions) -> Result<Self, TaxonomyError> {
        let by_id: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(handle, node)| (node.id.clone(), handle))
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut has_present_parent = vec![false; nodes.len()];
        for (handle, node) in nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for parent in &node.parent_ids {
                if let Some(&p) = by_id.get(parent) {
                    if seen.insert(p) {
                        children[p].push(handle);
                        has_present_parent[handle] = true;
                    }
                }
            }
        }

        let levels = compute_levels(&has_present_parent, &children);
        let reachable: Vec<bool> = levels.iter().map(Option::is_some).collect();

        let unreachable: Vec<&str> = nodes
            .iter()
            .zip(&levels)
            .filter(|(_, level)| level.is_none())
            .map(|(node, _)| node.id.as_str())
            .collect();

        if !unreachable.is_empty() {
            match options.disconnected {
                DisconnectedPolicy::Reject => {
                    return Err(TaxonomyError::Disconnected {
                        count: unreachable.len(),
                        sample: unreachable.iter().take(5).map(|s| s.to_string()).collect(),
                    });
                }
                DisconnectedPolicy::LevelZero => {
                    warn!(
                        count = unreachable.len(),
                        "Taxonomy nodes unreachable from any root, assigning level 0"
                    );
                }
            }
        }

        for (node, level) in nodes.iter_mut().zip(&levels) {
            node.level = level.unwrap_or(0);
        }

        let choices = build_choices(&nodes);
        debug!(variants = choices.len(), "Search variants built");

        Ok(Self {
            source: None,
            nodes,
            by_id,
            children,
            reachable,
            choices,
        })
    }

    /// Path the index was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&TaxonomyNode> {
        self.by_id.get(id).map(|&h| &self.nodes[h])
    }

    /// All nodes in id order
    pub fn nodes(&self) -> &[TaxonomyNode] {
        &self.nodes
    }

    /// Resolve a display label.
    ///
    /// Preferred language, then English, then any label, then the id
    /// itself. Unknown ids come back unchanged.
    pub fn get_label<'a>(&'a self, id: &'a str, prefer_lang: &str) -> &'a str {
        let Some(node) = self.node(id) else {
            return id;
        };
        node.labels
            .get(prefer_lang)
            .or_else(|| node.labels.get(FALLBACK_LANG))
            .or_else(|| node.labels.values().next())
            .map(String::as_str)
            .unwrap_or(id)
    }

    /// Stored parent ids (possibly empty, including ids missing from the graph)
    pub fn get_parent_ids(&self, id: &str) -> &[String] {
        self.node(id).map(|n| n.parent_ids.as_slice()).unwrap_or(&[])
    }

    /// Hierarchy depth; 0 for unknown ids
    pub fn get_level(&self, id: &str) -> u32 {
        self.node(id).map(|n| n.level).unwrap_or(0)
    }

    /// Every known ancestor of `id` with its minimum hop distance (1 = parent).
    ///
    /// Breadth-first with a visited set, so cyclic regions terminate. Parent
    /// ids missing from the graph are skipped. Nearer ancestors come first.
    pub fn ancestors(&self, id: &str) -> Vec<(&str, u32)> {
        let Some(&start) = self.by_id.get(id) else {
            return Vec::new();
        };

        let mut visited: HashSet<usize> = HashSet::from([start]);
        let mut queue: VecDeque<(usize, u32)> = VecDeque::from([(start, 0)]);
        let mut out = Vec::new();

        while let Some((handle, depth)) = queue.pop_front() {
            let mut parents: Vec<usize> = self.nodes[handle]
                .parent_ids
                .iter()
                .filter_map(|p| self.by_id.get(p).copied())
                .collect();
            parents.sort_unstable();
            for parent in parents {
                if visited.insert(parent) {
                    out.push((self.nodes[parent].id.as_str(), depth + 1));
                    queue.push_back((parent, depth + 1));
                }
            }
        }

        out
    }

    /// Roll a category up to the ancestor at `target_level`.
    ///
    /// Returns the id itself when it is already at that level, the
    /// lexicographically smallest ancestor at the level when one is found
    /// within the depth bound, and the id unchanged otherwise.
    pub fn ancestor_at_level<'a>(&'a self, id: &'a str, target_level: u32) -> &'a str {
        let Some(&start) = self.by_id.get(id) else {
            return id;
        };
        if self.nodes[start].level == target_level {
            return id;
        }

        let mut seen: HashSet<usize> = HashSet::new();
        let mut frontier: Vec<usize> = vec![start];

        for _ in 0..MAX_ROLLUP_DEPTH {
            let mut next: Vec<usize> = Vec::new();
            for handle in frontier {
                if !seen.insert(handle) {
                    continue;
                }
                next.extend(
                    self.nodes[handle]
                        .parent_ids
                        .iter()
                        .filter_map(|p| self.by_id.get(p).copied()),
                );
            }

            let hit = next
                .iter()
                .map(|&h| &self.nodes[h])
                .filter(|n| n.level == target_level)
                .map(|n| n.id.as_str())
                .min();
            if let Some(found) = hit {
                return found;
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        id
    }

    /// Fuzzy lexical search over every label variant and id token.
    ///
    /// Scores are 0-100; each node keeps its best variant. Ordered by score
    /// descending, then level descending (narrower first), then id
    /// ascending. Nodes scoring 0 are not returned.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CategoryCandidate> {
        let processed = ProcessedText::new(query);
        if processed.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut best: HashMap<usize, u8> = HashMap::new();
        for choice in &self.choices {
            let score = similarity::weighted_ratio(&processed, &choice.text);
            if score == 0 {
                continue;
            }
            let entry = best.entry(choice.node).or_insert(0);
            if score > *entry {
                *entry = score;
            }
        }

        let mut ranked: Vec<(usize, u8)> = best.into_iter().collect();
        ranked.sort_by(|&(ha, sa), &(hb, sb)| {
            sb.cmp(&sa)
                .then_with(|| self.nodes[hb].level.cmp(&self.nodes[ha].level))
                .then_with(|| self.nodes[ha].id.cmp(&self.nodes[hb].id))
        });
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(handle, score)| self.candidate(handle, score))
            .collect()
    }

    /// Candidate for a known id with the given lexical score
    pub fn candidate_for(&self, id: &str, lexical_score: u8) -> Option<CategoryCandidate> {
        self.by_id
            .get(id)
            .map(|&handle| self.candidate(handle, lexical_score))
    }

    fn candidate(&self, handle: usize, lexical_score: u8) -> CategoryCandidate {
        let node = &self.nodes[handle];
        CategoryCandidate {
            category_id: node.id.clone(),
            label: self.get_label(&node.id, FALLBACK_LANG).to_string(),
            lexical_score,
            level: node.level,
            parent_ids: node
                .parent_ids
                .iter()
                .take(MAX_CANDIDATE_PARENTS)
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn children_of(&self, handle: usize) -> &[usize] {
        &self.children[handle]
    }

    pub(crate) fn is_reachable(&self, handle: usize) -> bool {
        self.reachable[handle]
    }

    pub(crate) fn handle(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }
}

/// Multi-source BFS from all roots. `None` = never reached.
fn compute_levels(has_present_parent: &[bool], children: &[Vec<usize>]) -> Vec<Option<u32>> {
    let mut level: Vec<Option<u32>> = vec![None; children.len()];
    let mut queue: VecDeque<usize> = VecDeque::new();

    for (handle, &has_parent) in has_present_parent.iter().enumerate() {
        if !has_parent {
            level[handle] = Some(0);
            queue.push_back(handle);
        }
    }

    while let Some(u) = queue.pop_front() {
        let Some(base) = level[u] else { continue };
        for &v in &children[u] {
            let candidate = base + 1;
            if level[v].map_or(true, |prev| candidate < prev) {
                level[v] = Some(candidate);
                queue.push_back(v);
            }
        }
    }

    level
}

fn collect_labels(raw: Option<serde_json::Value>) -> BTreeMap<String, String> {
    let Some(serde_json::Value::Object(map)) = raw else {
        return BTreeMap::new();
    };
    map.into_iter()
        .filter_map(|(lang, value)| match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Some((lang, s.trim().to_string()))
            }
            _ => None,
        })
        .collect()
}

fn collect_parent_ids(raw: Option<serde_json::Value>) -> Vec<String> {
    let Some(serde_json::Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect()
}

/// Token from an id's local segment: "en:green-tea" → "green tea"
fn id_token(id: &str) -> Option<String> {
    let (_, local) = id.split_once(':')?;
    let token = local.replace('-', " ").trim().to_string();
    (!token.is_empty()).then_some(token)
}

fn build_choices(nodes: &[TaxonomyNode]) -> Vec<SearchChoice> {
    let mut choices = Vec::new();
    for (handle, node) in nodes.iter().enumerate() {
        let mut variants: Vec<String> = node.labels.values().cloned().collect();
        if let Some(token) = id_token(&node.id) {
            variants.push(token);
        }
        variants.sort();
        variants.dedup();

        for text in variants.into_iter().take(MAX_VARIANTS_PER_NODE) {
            let processed = ProcessedText::new(&text);
            if !processed.is_empty() {
                choices.push(SearchChoice {
                    text: processed,
                    node: handle,
                });
            }
        }
    }
    choices
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(value: serde_json::Value) -> TaxonomyIndex {
        TaxonomyIndex::from_value(value, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn test_chain_levels() {
        let idx = index(json!({
            "en:root": {"labels": {"en": "Root"}},
            "en:a": {"labels": {"en": "A"}, "parent_ids": ["en:root"]},
            "en:b": {"labels": {"en": "B"}, "parent_ids": ["en:a"]},
        }));
        assert_eq!(idx.get_level("en:root"), 0);
        assert_eq!(idx.get_level("en:a"), 1);
        assert_eq!(idx.get_level("en:b"), 2);
    }

    #[test]
    fn test_level_is_min_over_parents() {
        // x has parents at level 1 (a) and level 2 (b)
        let idx = index(json!({
            "en:root": {"labels": {"en": "Root"}},
            "en:a": {"labels": {"en": "A"}, "parent_ids": ["en:root"]},
            "en:b": {"labels": {"en": "B"}, "parent_ids": ["en:a"]},
            "en:x": {"labels": {"en": "X"}, "parent_ids": ["en:b", "en:a"]},
        }));
        assert_eq!(idx.get_level("en:x"), 2);
    }

    #[test]
    fn test_missing_parent_makes_root() {
        let idx = index(json!({
            "en:orphan": {"labels": {"en": "Orphan"}, "parent_ids": ["en:not-in-file"]},
            "en:kid": {"labels": {"en": "Kid"}, "parent_ids": ["en:orphan"]},
        }));
        assert_eq!(idx.get_level("en:orphan"), 0);
        assert_eq!(idx.get_level("en:kid"), 1);
        // Stored list is returned unfiltered
        assert_eq!(idx.get_parent_ids("en:orphan"), ["en:not-in-file".to_string()]);
    }

    #[test]
    fn test_isolated_cycle_defaults_to_level_zero() {
        let doc = json!({
            "en:root": {"labels": {"en": "Root"}},
            "en:p": {"labels": {"en": "P"}, "parent_ids": ["en:q"]},
            "en:q": {"labels": {"en": "Q"}, "parent_ids": ["en:p"]},
        });
        let idx = index(doc.clone());
        assert_eq!(idx.get_level("en:p"), 0);
        assert_eq!(idx.get_level("en:q"), 0);

        let reject = LoadOptions {
            disconnected: DisconnectedPolicy::Reject,
        };
        match TaxonomyIndex::from_value(doc, &reject) {
            Err(TaxonomyError::Disconnected { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected Disconnected error, got {:?}", other.map(|i| i.len())),
        }
    }

    #[test]
    fn test_label_fallbacks() {
        let idx = index(json!({
            "en:tea": {"labels": {"en": "Tea", "ru": "Чай"}},
            "fr:the": {"labels": {"fr": "Thé"}},
            "en:bare": {"labels": {}},
        }));
        assert_eq!(idx.get_label("en:tea", "ru"), "Чай");
        assert_eq!(idx.get_label("en:tea", "fr"), "Tea");
        assert_eq!(idx.get_label("fr:the", "ru"), "Thé");
        assert_eq!(idx.get_label("en:bare", "en"), "en:bare");
        assert_eq!(idx.get_label("en:unknown", "en"), "en:unknown");
    }

    #[test]
    fn test_accepts_name_and_parents_keys() {
        let idx = index(json!({
            "en:drinks": {"name": {"en": "Drinks"}},
            "en:tea": {"name": {"en": "Tea", "de": 7}, "parents": ["en:drinks", 3, ""]},
        }));
        assert_eq!(idx.get_level("en:tea"), 1);
        assert_eq!(idx.get_parent_ids("en:tea"), ["en:drinks".to_string()]);
        assert_eq!(idx.node("en:tea").unwrap().labels.len(), 1);
    }

    #[test]
    fn test_malformed_input_is_fatal() {
        assert!(matches!(
            TaxonomyIndex::from_json_str("[1, 2]", &LoadOptions::default()),
            Err(TaxonomyError::Shape(_))
        ));
        assert!(matches!(
            TaxonomyIndex::from_json_str("{\"en:x\": 5}", &LoadOptions::default()),
            Err(TaxonomyError::Shape(_))
        ));
        assert!(matches!(
            TaxonomyIndex::from_json_str("{not json", &LoadOptions::default()),
            Err(TaxonomyError::Parse(_))
        ));
    }

    #[test]
    fn test_ancestors_terminate_on_cycles() {
        let idx = index(json!({
            "en:root": {"labels": {"en": "Root"}},
            "en:a": {"labels": {"en": "A"}, "parent_ids": ["en:root", "en:c"]},
            "en:b": {"labels": {"en": "B"}, "parent_ids": ["en:a"]},
            "en:c": {"labels": {"en": "C"}, "parent_ids": ["en:b"]},
        }));
        let ancestors = idx.ancestors("en:b");
        assert_eq!(ancestors, vec![("en:a", 1), ("en:c", 2), ("en:root", 2)]);
    }

    #[test]
    fn test_ancestor_at_level() {
        let idx = index(json!({
            "en:root": {"labels": {"en": "Root"}},
            "en:z": {"labels": {"en": "Z"}, "parent_ids": ["en:root"]},
            "en:y": {"labels": {"en": "Y"}, "parent_ids": ["en:root"]},
            "en:leaf": {"labels": {"en": "Leaf"}, "parent_ids": ["en:z", "en:y"]},
        }));
        assert_eq!(idx.ancestor_at_level("en:leaf", 1), "en:y");
        assert_eq!(idx.ancestor_at_level("en:leaf", 0), "en:root");
        assert_eq!(idx.ancestor_at_level("en:leaf", 2), "en:leaf");
        assert_eq!(idx.ancestor_at_level("en:root", 3), "en:root");
    }

    #[test]
    fn test_search_finds_labels_in_any_language() {
        let idx = index(json!({
            "en:beverages": {"labels": {"en": "Beverages"}},
            "en:teas": {"labels": {"en": "Teas", "ru": "Чай"}, "parent_ids": ["en:beverages"]},
            "en:green-teas": {"labels": {"en": "Green teas", "ru": "Зелёный чай"}, "parent_ids": ["en:teas"]},
            "en:coffees": {"labels": {"en": "Coffees"}, "parent_ids": ["en:beverages"]},
        }));

        let hits = idx.search("чай", 10);
        assert_eq!(hits[0].category_id, "en:teas");
        assert_eq!(hits[0].lexical_score, 100);
        assert!(hits.iter().any(|c| c.category_id == "en:green-teas"));
        assert!(hits.iter().all(|c| c.lexical_score > 0));
    }

    #[test]
    fn test_search_is_deterministic_and_limited() {
        let idx = index(json!({
            "en:a-tea": {"labels": {"en": "Tea"}},
            "en:b-tea": {"labels": {"en": "Tea"}},
            "en:c-tea": {"labels": {"en": "Tea"}, "parent_ids": ["en:a-tea"]},
        }));
        let first: Vec<String> = idx.search("tea", 3).into_iter().map(|c| c.category_id).collect();
        let second: Vec<String> = idx.search("tea", 3).into_iter().map(|c| c.category_id).collect();
        assert_eq!(first, second);
        // Equal score: narrower level first, then id ascending
        assert_eq!(first, vec!["en:c-tea", "en:a-tea", "en:b-tea"]);
        assert_eq!(idx.search("tea", 1).len(), 1);
        assert!(idx.search("   ", 5).is_empty());
    }
}
