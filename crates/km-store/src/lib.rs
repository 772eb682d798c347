pub mod connection;
pub mod document_store;
pub mod error;
pub mod schema;
pub mod vector_store;

pub use connection::VectorDb;
pub use document_store::{DocumentStore, StreamableFile};
pub use error::{Result, StoreError};
pub use schema::records_schema;
pub use vector_store::VectorStore;
