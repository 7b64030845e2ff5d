//! Document ingestion: metadata model, relational persistence and the
//! parse → chunk → embed → persist pipeline.

mod pipeline;
mod sqlite;
mod store;

pub use pipeline::IngestionPipeline;
pub use sqlite::SqliteDocumentStore;
pub use store::{
    Document, DocumentChunk, DocumentStatus, DocumentStore, DocumentSummary, NewDocument,
};
