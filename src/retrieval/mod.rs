//! 检索层：向量库抽象与实现（本地 / Pinecone）、文档分块与导入

pub mod chunker;
pub mod ingest;
pub mod local;
pub mod pinecone;
pub mod store;

pub use chunker::{Chunk, Chunker, ChunkingConfig};
pub use ingest::{IngestReport, Ingestor};
pub use local::LocalVectorStore;
pub use pinecone::PineconeVectorStore;
pub use store::{create_vector_store, Metadata, Passage, VectorRecord, VectorStore};
