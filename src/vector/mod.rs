//! Vector storage: embedding persistence and similarity search.

mod sqlite;
mod store;

pub use sqlite::SqliteVectorStore;
pub use store::{
    CollectionInfo, PayloadFilter, VectorMatch, VectorMetadata, VectorPayload, VectorPoint,
    VectorStore,
};
