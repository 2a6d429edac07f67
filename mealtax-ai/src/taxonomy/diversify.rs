//! Level-aware candidate diversification

use super::CategoryCandidate;
use std::collections::{BTreeMap, VecDeque};

/// Parameters for [`diversify_by_level`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiversifyOptions {
    pub limit: usize,
    pub max_per_level: usize,
    /// Visit broad levels (low numbers) first
    pub prefer_broader: bool,
    /// Keep the single best-scoring candidate regardless of level caps
    pub always_include_best: bool,
}

impl Default for DiversifyOptions {
    fn default() -> Self {
        Self {
            limit: 30,
            max_per_level: 6,
            prefer_broader: true,
            always_include_best: true,
        }
    }
}

/// Select at most `limit` candidates spread across hierarchy levels.
///
/// The overall best candidate (highest score, broader level on ties) is
/// placed first when `always_include_best` is set and does not count
/// against its level's cap. Remaining slots are filled round-robin, one
/// candidate per level per pass, each level drained in score order.
pub fn diversify_by_level(
    candidates: &[CategoryCandidate],
    options: DiversifyOptions,
) -> Vec<CategoryCandidate> {
    if options.limit == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&CategoryCandidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| {
        b.lexical_score
            .cmp(&a.lexical_score)
            .then_with(|| a.level.cmp(&b.level))
            .then_with(|| a.category_id.cmp(&b.category_id))
    });

    let mut picked: Vec<CategoryCandidate> = Vec::with_capacity(options.limit);
    let forced_id = if options.always_include_best {
        sorted.first().map(|best| {
            picked.push((*best).clone());
            best.category_id.as_str()
        })
    } else {
        None
    };

    // Already score-ordered, so each level's queue is too
    let mut by_level: BTreeMap<u32, VecDeque<&CategoryCandidate>> = BTreeMap::new();
    for candidate in &sorted {
        if Some(candidate.category_id.as_str()) == forced_id {
            continue;
        }
        by_level.entry(candidate.level).or_default().push_back(candidate);
    }

    let mut levels: Vec<u32> = by_level.keys().copied().collect();
    if !options.prefer_broader {
        levels.reverse();
    }

    let mut picked_per_level: BTreeMap<u32, usize> = BTreeMap::new();
    let mut progressed = true;
    while progressed && picked.len() < options.limit {
        progressed = false;
        for level in &levels {
            if picked.len() >= options.limit {
                break;
            }
            let taken = picked_per_level.entry(*level).or_insert(0);
            if *taken >= options.max_per_level {
                continue;
            }
            let Some(next) = by_level.get_mut(level).and_then(VecDeque::pop_front) else {
                continue;
            };
            picked.push(next.clone());
            *taken += 1;
            progressed = true;
        }
    }

    picked.truncate(options.limit);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, score: u8, level: u32) -> CategoryCandidate {
        CategoryCandidate {
            category_id: id.to_string(),
            label: id.to_string(),
            lexical_score: score,
            level,
            parent_ids: Vec::new(),
        }
    }

    fn spread() -> Vec<CategoryCandidate> {
        let mut all = vec![cand("root", 90, 0)];
        for i in 0..5 {
            all.push(cand(&format!("mid{}", i), 80 - i as u8, 1));
            all.push(cand(&format!("leaf{}", i), 95 - i as u8, 2));
        }
        all
    }

    fn count_level(picked: &[CategoryCandidate], level: u32) -> usize {
        picked.iter().filter(|c| c.level == level).count()
    }

    #[test]
    fn test_caps_and_keeps_level_zero() {
        let opts = DiversifyOptions {
            limit: 5,
            max_per_level: 2,
            prefer_broader: true,
            always_include_best: true,
        };
        let picked = diversify_by_level(&spread(), opts);

        assert_eq!(picked.len(), 5);
        assert!(picked.iter().any(|c| c.category_id == "root"));
        assert!(count_level(&picked, 1) <= 2);
        // The forced best (leaf0) is exempt from the cap
        assert!(count_level(&picked, 2) <= 3);
        assert_eq!(picked[0].category_id, "leaf0");
    }

    #[test]
    fn test_without_forced_best_caps_every_level() {
        let opts = DiversifyOptions {
            limit: 5,
            max_per_level: 2,
            prefer_broader: true,
            always_include_best: false,
        };
        let picked = diversify_by_level(&spread(), opts);

        assert_eq!(count_level(&picked, 0), 1);
        assert_eq!(count_level(&picked, 1), 2);
        assert_eq!(count_level(&picked, 2), 2);
        assert_eq!(picked[0].category_id, "root");
    }

    #[test]
    fn test_narrow_first_order() {
        let opts = DiversifyOptions {
            limit: 3,
            max_per_level: 6,
            prefer_broader: false,
            always_include_best: false,
        };
        let picked = diversify_by_level(&spread(), opts);
        let levels: Vec<u32> = picked.iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![2, 1, 0]);
    }

    #[test]
    fn test_terminates_when_pools_exhausted() {
        let opts = DiversifyOptions {
            limit: 100,
            max_per_level: 100,
            ..DiversifyOptions::default()
        };
        let picked = diversify_by_level(&spread(), opts);
        assert_eq!(picked.len(), 11);
    }

    #[test]
    fn test_empty_and_zero_limit() {
        assert!(diversify_by_level(&[], DiversifyOptions::default()).is_empty());
        let opts = DiversifyOptions {
            limit: 0,
            ..DiversifyOptions::default()
        };
        assert!(diversify_by_level(&spread(), opts).is_empty());
    }
}
