//! 记忆层：代码分块、语义存储、会话级代码记忆与后台索引

pub mod code_memory;
pub mod indexer;
pub mod rag;
pub mod store;
pub mod tokenizer;

pub use code_memory::CodeMemory;
pub use indexer::BackgroundIndexer;
pub use rag::{Chunk, Chunker, ChunkingConfig};
pub use store::{InMemorySemanticStore, SemanticStore, StoreError, StoreHit};
