//! Human-readable classification summary

use crate::models::ItemLinkResult;
use std::fmt::Write;

const NO_MATCH_REASON: &str = "no good match";

fn header(lang: &str) -> &'static str {
    match lang {
        "ru" => "Распознанные продукты и категории:",
        _ => "Detected items and category suggestions:",
    }
}

/// Render results as the text shown to the person who logged the meal.
///
/// Returns an empty string when there is nothing to show.
pub fn render_summary(results: &[ItemLinkResult], lang: &str) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut out = String::from(header(lang));
    for result in results {
        let item = &result.item;
        let _ = write!(out, "\n- {} ({})", item.normalized_primary, item.item_type);
        if !result.top3.is_empty() {
            for category in result.top3.iter().take(3) {
                let _ = write!(
                    out,
                    "\n  - {} ({}) — {:.0}%",
                    category.label,
                    category.category_id,
                    category.score * 100.0
                );
            }
        } else if result.abstain {
            let reason = result.abstain_reason.as_deref().unwrap_or(NO_MATCH_REASON);
            let _ = write!(out, "\n  - (no match) {}", reason);
        }
    }
    out
}

/// Text for one `classify` run. An unconfigured key is reported as such,
/// never as an empty classification.
pub fn render_outcome(results: &[ItemLinkResult], lang: &str, has_credentials: bool) -> String {
    if !has_credentials {
        "No API key configured; meal not classified.".to_string()
    } else if results.is_empty() {
        "No items detected.".to_string()
    } else {
        render_summary(results, lang)
    }
}
