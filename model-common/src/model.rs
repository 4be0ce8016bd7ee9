//! Normalised in-memory model
//!
//! Every source format is adapted into this representation before merging, and
//! the merged result is encoded from it. A [`Model`] owns its bones, meshes,
//! materials and shape names outright.
//!
//! # Invariants
//!
//! - Bone 0 is the model's own root bone (parent index `-1`).
//! - Every bone's parent index is `-1` or points at a bone stored *before* it.
//! - Bone names are unique within a model.
//! - Vertex weight, shape and mesh material indices are valid indices into the
//!   owning model's collections.
//!
//! [`Model::validate`] checks all of the above; [`Model::resolve`] validates and
//! then derives global bone poses.

use glam::{Quat, Vec2, Vec3, Vec4};
use hashbrown::HashSet;

use crate::transform::compute_global_poses;

/// Model invariant violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("bone '{bone}' has parent index {parent}, but the model only has {count} bones")]
    ParentOutOfRange {
        bone: String,
        parent: i32,
        count: usize,
    },

    #[error("bone '{bone}' at index {index} has parent {parent}, which is not stored before it")]
    ParentNotResolved {
        bone: String,
        index: usize,
        parent: i32,
    },

    #[error("bone name '{0}' appears more than once")]
    DuplicateBone(String),

    #[error("mesh {mesh} vertex {vertex} is weighted to bone {bone}, but the model only has {count} bones")]
    WeightOutOfRange {
        mesh: usize,
        vertex: usize,
        bone: u32,
        count: usize,
    },

    #[error("mesh {mesh} vertex {vertex} references shape {shape}, but the model only has {count} shapes")]
    ShapeOutOfRange {
        mesh: usize,
        vertex: usize,
        shape: u32,
        count: usize,
    },

    #[error("mesh {mesh} vertex {vertex} carries more than one delta for shape {shape}")]
    DuplicateShape { mesh: usize, vertex: usize, shape: u32 },

    #[error("mesh {mesh} references material {material}, but the model only has {count} materials")]
    MaterialOutOfRange {
        mesh: usize,
        material: u32,
        count: usize,
    },

    #[error("mesh {mesh} face {face} references vertex {vertex}, but the mesh only has {count} vertices")]
    FaceOutOfRange {
        mesh: usize,
        face: usize,
        vertex: u32,
        count: usize,
    },
}

/// A single bone of a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    /// Unique (within the model) bone name
    pub name: String,
    /// Index of the parent bone, `-1` for a root
    pub parent_index: i32,
    /// Position relative to the parent
    pub local_position: Vec3,
    /// Orientation relative to the parent
    pub local_rotation: Quat,
    /// Absolute position, derived by [`compute_global_poses`]
    pub global_position: Vec3,
    /// Absolute orientation, derived by [`compute_global_poses`]
    pub global_rotation: Quat,
}

impl Bone {
    /// Create a bone from its local pose. The global pose starts out equal to
    /// the local pose until the owning model is resolved.
    pub fn new(
        name: impl Into<String>,
        parent_index: i32,
        local_position: Vec3,
        local_rotation: Quat,
    ) -> Self {
        Self {
            name: name.into(),
            parent_index,
            local_position,
            local_rotation,
            global_position: local_position,
            global_rotation: local_rotation,
        }
    }

    /// Parent index, or `None` for a root bone
    pub fn parent(&self) -> Option<usize> {
        usize::try_from(self.parent_index).ok()
    }

    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }
}

/// Bone influence on a vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight {
    pub bone_index: u32,
    /// Not required to be normalised across a vertex
    pub influence: f32,
}

impl Weight {
    pub fn new(bone_index: u32, influence: f32) -> Self {
        Self {
            bone_index,
            influence,
        }
    }
}

/// Per-vertex displacement for a named morph target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeDelta {
    pub shape_index: u32,
    /// Displacement from the base position (target - base)
    pub delta: Vec3,
}

impl ShapeDelta {
    pub fn new(shape_index: u32, delta: Vec3) -> Self {
        Self { shape_index, delta }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    /// RGBA, normalised 0-1
    pub color: Vec4,
    pub uvs: Vec<Vec2>,
    pub weights: Vec<Weight>,
    pub shapes: Vec<ShapeDelta>,
}

impl Vertex {
    /// Create a white vertex with no tangent, UVs, weights or shapes
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position,
            normal,
            tangent: Vec3::ZERO,
            color: Vec4::ONE,
            uvs: Vec::new(),
            weights: Vec::new(),
            shapes: Vec::new(),
        }
    }
}

/// Triangle, winding order preserved from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub indices: [u32; 3],
}

impl Face {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { indices: [a, b, c] }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    /// Indices into the owning model's materials, usually exactly one
    pub material_indices: Vec<u32>,
}

impl Mesh {
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            material_indices: Vec::new(),
        }
    }

    /// Largest number of weights carried by any vertex
    pub fn max_influence(&self) -> usize {
        self.vertices
            .iter()
            .map(|v| v.weights.len())
            .max()
            .unwrap_or(0)
    }

    /// Largest number of UV sets carried by any vertex
    pub fn uv_layer_count(&self) -> usize {
        self.vertices.iter().map(|v| v.uvs.len()).max().unwrap_or(0)
    }
}

/// Material reference. Only the name takes part in merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub name: String,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// Identifier, taken from the source file stem
    pub name: String,
    pub bones: Vec<Bone>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    /// Morph target names
    pub shapes: Vec<String>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The model's own root bone (bone 0)
    pub fn root_bone(&self) -> Option<&Bone> {
        self.bones.first()
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn has_bone(&self, name: &str) -> bool {
        self.bone_index(name).is_some()
    }

    pub fn material_index(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    pub fn shape_index(&self, name: &str) -> Option<usize> {
        self.shapes.iter().position(|s| s == name)
    }

    /// Check the model invariants listed in the module docs
    pub fn validate(&self) -> Result<(), ModelError> {
        let bone_count = self.bones.len();
        let mut names = HashSet::with_capacity(bone_count);

        for (index, bone) in self.bones.iter().enumerate() {
            if !names.insert(bone.name.as_str()) {
                return Err(ModelError::DuplicateBone(bone.name.clone()));
            }

            if let Some(parent) = bone.parent() {
                if parent >= bone_count {
                    return Err(ModelError::ParentOutOfRange {
                        bone: bone.name.clone(),
                        parent: bone.parent_index,
                        count: bone_count,
                    });
                }
                if parent >= index {
                    return Err(ModelError::ParentNotResolved {
                        bone: bone.name.clone(),
                        index,
                        parent: bone.parent_index,
                    });
                }
            }
        }

        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            for &material in &mesh.material_indices {
                if material as usize >= self.materials.len() {
                    return Err(ModelError::MaterialOutOfRange {
                        mesh: mesh_index,
                        material,
                        count: self.materials.len(),
                    });
                }
            }

            for (vertex_index, vertex) in mesh.vertices.iter().enumerate() {
                if let Some(weight) = vertex
                    .weights
                    .iter()
                    .find(|w| w.bone_index as usize >= bone_count)
                {
                    return Err(ModelError::WeightOutOfRange {
                        mesh: mesh_index,
                        vertex: vertex_index,
                        bone: weight.bone_index,
                        count: bone_count,
                    });
                }
                if let Some(shape) = vertex
                    .shapes
                    .iter()
                    .find(|s| s.shape_index as usize >= self.shapes.len())
                {
                    return Err(ModelError::ShapeOutOfRange {
                        mesh: mesh_index,
                        vertex: vertex_index,
                        shape: shape.shape_index,
                        count: self.shapes.len(),
                    });
                }
                for (i, delta) in vertex.shapes.iter().enumerate() {
                    if vertex.shapes[..i]
                        .iter()
                        .any(|s| s.shape_index == delta.shape_index)
                    {
                        return Err(ModelError::DuplicateShape {
                            mesh: mesh_index,
                            vertex: vertex_index,
                            shape: delta.shape_index,
                        });
                    }
                }
            }

            let vertex_count = mesh.vertices.len();
            for (face_index, face) in mesh.faces.iter().enumerate() {
                if let Some(&vertex) = face.indices.iter().find(|&&i| i as usize >= vertex_count) {
                    return Err(ModelError::FaceOutOfRange {
                        mesh: mesh_index,
                        face: face_index,
                        vertex,
                        count: vertex_count,
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate, then derive every bone's global pose from its parent chain
    pub fn resolve(&mut self) -> Result<(), ModelError> {
        self.validate()?;
        compute_global_poses(&mut self.bones)
    }
}
