//! Classification services
//!
//! Inference client and retry policy, the item extractor and the category
//! linker built on top of them.

pub mod category_linker;
pub mod inference_client;
pub mod item_extractor;
pub mod prompts;
pub mod retry_policy;

pub use category_linker::{CategoryLinker, Linking, PackedCandidate, RerankDecision};
pub use inference_client::{
    ChatJson, ChatRequest, InferenceError, InferenceService, InferenceSettings, OpenAiClient,
};
pub use item_extractor::{Extraction, ItemExtractor};
pub use prompts::PROMPT_VERSION;
pub use retry_policy::{RetryPolicy, Retryable};
