pub mod provider;
pub mod worker;

pub use provider::{EmbedError, EmbeddingProvider, ProviderInfo};
pub use worker::EmbeddingWorker;
