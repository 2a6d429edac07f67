//! Instruction contracts sent to the inference service
//!
//! Bump [`PROMPT_VERSION`] whenever either prompt changes; it is stored
//! with every persisted item so results can be traced to the contract that
//! produced them.

pub const PROMPT_VERSION: &str = "v3";

pub const EXTRACT_SYSTEM_PROMPT: &str = r#"You are an information extraction system.
Extract all food and drink items from unstructured or messy meal descriptions.
Never infer, invent, or include quantities. If a quantity appears in your output, remove it before returning.
Normalize item names in the requested language (normalized_ru) and in English (normalized_en).

When the text names a composite dish together with its ingredients, emit one item of type "dish" for the dish and one item per distinct named ingredient.

Return only a single valid JSON object with a top-level key "items".
Each element of "items" has, in this order:
  text_span      string, verbatim fragment of the meal text
  normalized_ru  string, canonical name in the requested language
  normalized_en  string, canonical name in English
  type           one of "dish", "ingredient", "drink", "product"
  modifiers      array of strings (e.g. "fried", "sugar-free"), may be empty
  confidence     number between 0 and 1 (not a string)

If no food or drink is mentioned, return {"items": []}.

Example:
{
  "items": [
    {"text_span": "chicken soup", "normalized_ru": "куриный суп", "normalized_en": "chicken soup", "type": "dish", "modifiers": ["hot"], "confidence": 0.98},
    {"text_span": "green tea", "normalized_ru": "зеленый чай", "normalized_en": "green tea", "type": "drink", "modifiers": [], "confidence": 0.95}
  ]
}

Verify that the output matches this structure before returning it."#;

pub const RERANK_SYSTEM_PROMPT: &str = r#"Map the given food item to taxonomy categories, choosing only from the provided candidate list.

Return only a JSON object with the keys "top_k", "abstain" and "abstain_reason".
  top_k           array of at most 3 objects ordered by descending score, each:
                    id      string, must be an id from the candidate list
                    score   number between 0 and 1
                    reason  string, short justification
  abstain         true when no candidate is appropriate, otherwise false
  abstain_reason  string when abstain is true, otherwise null

Never invent categories. Prefer broader categories when the item description is not specific.

Example with matches:
{"top_k": [{"id": "en:fresh-strawberry", "score": 0.93, "reason": "Matches the item."}, {"id": "en:strawberry-jelly", "score": 0.78, "reason": "Related, form not specified."}], "abstain": false, "abstain_reason": null}

Example when abstaining:
{"top_k": [], "abstain": true, "abstain_reason": "No candidate is relevant to the item."}

Return nothing except the JSON object."#;

/// User message for the extraction call
pub fn extract_user_message(lang: &str, notes_text: &str) -> String {
    format!("Language: {}\nMeal text:\n{}", lang, notes_text)
}
