pub mod checkpoint;
pub mod context;
pub mod engine;
pub mod loader;
pub mod mapping_builder;
pub mod mappings;
pub mod model;

pub use checkpoint::{Checkpoint, StateDict, TensorRecord};
pub use context::RecommenderContext;
pub use engine::recommend;
pub use loader::load;
pub use mapping_builder::{build_mappings, MappingArtifacts};
pub use mappings::{ItemMapArtifact, MappingStore, UserMapArtifact};
pub use model::{ModelDims, NcfModel};
