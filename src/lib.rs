//! ragdocs: a retrieval-augmented knowledge base core.
//!
//! Ingests user-owned documents (parse → chunk → embed → persist) and
//! answers chat queries with retrieval-augmented generation, coordinating a
//! relational store, a vector store and an embedding/completion provider.

pub mod chat;
pub mod chunker;
pub mod config;
pub mod documents;
pub mod errors;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod vector;

pub use chat::{ChatStore, RagQueryEngine, SqliteChatStore};
pub use config::AppConfig;
pub use documents::{DocumentStore, IngestionPipeline, SqliteDocumentStore};
pub use errors::RagError;
pub use extract::ExtractorRegistry;
pub use llm::{ModelProvider, OpenAiCompatProvider};
pub use vector::{SqliteVectorStore, VectorStore};
