//! Reading what the engine leaves on disk: size strings and the TOML stat and
//! configuration documents of artifacts and runs.

pub mod documents;
pub mod size;

pub use documents::{
    ArtifactConfig, Document, DocumentError, EngineStats, MemoryStats, RunStats, StorageConfig,
    TopK,
};
pub use size::{format_size, parse_size, parse_size_str, SizeParseError, SizeValue};
