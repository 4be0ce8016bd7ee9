//! Shared types and utilities for the model merger
//!
//! This crate provides the pieces shared between the merge tool and anything
//! else that reads or writes merged models:
//!
//! # Modules
//!
//! - [`model`] - Normalised in-memory model (bones, meshes, materials, shapes)
//! - [`transform`] - Global bone pose composition and rigid deltas between skeletons
//! - [`formats`] - Cast binary scene-graph codec and the byte reader used by decoders

pub mod formats;
pub mod model;
pub mod transform;

// Re-export the model types
pub use model::{Bone, Face, Material, Mesh, Model, ModelError, ShapeDelta, Vertex, Weight};

// Re-export transform helpers
pub use transform::{RigidDelta, compute_delta, compute_global_poses};

// Re-export commonly used format items
pub use formats::{ByteReader, CastFile, CastNode, CastNodeId, CastProperty, CastPropertyId};
