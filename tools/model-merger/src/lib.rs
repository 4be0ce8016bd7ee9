//! model-merger library
//!
//! Reconciles independently authored skeletal models into one model whose
//! skeleton is a superset of every input, then encodes it as a Cast file.
//!
//! Pipeline: [`loader`] → [`resolver`] (using [`graph`] and [`remap`]) →
//! [`export`]. [`run`] wires the stages together for the CLI.

pub mod error;
pub mod export;
pub mod graph;
pub mod loader;
pub mod remap;
pub mod resolver;
pub mod run;

pub use error::MergeError;
pub use export::{encode_model, model_to_cast};
pub use graph::AttachmentGraph;
pub use loader::{ModelFormat, load_model, load_models};
pub use remap::SpliceTables;
pub use resolver::{ModelBuilder, merge_models, select_root};
pub use run::{MergeOptions, MergeReport, run_merge};

// Re-export the model types so callers only need this crate
pub use model_common::{Bone, Face, Material, Mesh, Model, ShapeDelta, Vertex, Weight};
