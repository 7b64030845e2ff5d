//! Embedding and completion provider abstraction.

mod openai;
mod provider;
mod types;

pub use openai::OpenAiCompatProvider;
pub use provider::ModelProvider;
pub use types::{ChatMessage, CompletionRequest, ProviderModel};
