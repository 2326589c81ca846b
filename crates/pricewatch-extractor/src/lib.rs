pub mod batch;
pub mod budget;
pub mod candidate;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod locator;
pub mod orchestrator;
pub mod parse;
pub mod render_pool;
mod retry;
pub mod selector_cache;
pub mod store;
pub mod tiers;
pub mod validate;
pub mod variant;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{run_batch, BatchConfig, BatchHandle, BatchReport, BatchRunner, BatchState, BatchStatus};
pub use budget::{BudgetGuard, BudgetLimits};
pub use error::{ExtractError, FetchError, ModelError, RenderError, StoreError};
pub use fetch::{Capability, FetchConfig, HttpRenderService, PageFetcher, RenderServiceEndpoint};
pub use llm::{ChatCompletionsConfig, ChatCompletionsModel, LanguageModel};
pub use locator::Locator;
pub use orchestrator::{Extractor, ExtractorConfig, ExtractorServices};
pub use parse::NumericPriceParser;
pub use render_pool::{BrowserHandle, BrowserLauncher, BrowserSession, RenderPool, RenderPoolConfig};
pub use selector_cache::SelectorCache;
pub use store::{MemoryStore, PriceStore};
pub use validate::{PriceValidator, ValidationConfig};
pub use verifier::VariantPriceVerifier;
