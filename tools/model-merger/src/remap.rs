//! Index translation for a single splice pass
//!
//! Bones, materials and shapes are matched purely by name. Entries missing
//! from the accumulator are appended as the tables are built, so the tables
//! always agree with the accumulator state they were built against.

use model_common::{Bone, Mesh, Model, RigidDelta, ShapeDelta, Vertex, Weight};

use crate::MergeError;
use crate::resolver::ModelBuilder;

/// Source index -> accumulator index, for one source model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceTables {
    source: String,
    bones: Vec<u32>,
    materials: Vec<u32>,
    shapes: Vec<u32>,
}

impl SpliceTables {
    /// Translate every bone, material and shape of `source` into `builder`,
    /// appending the ones the builder does not have yet
    pub fn build(builder: &mut ModelBuilder, source: &Model) -> Result<Self, MergeError> {
        let mut bones = Vec::with_capacity(source.bones.len());
        for bone in &source.bones {
            let index = match builder.bone_index(&bone.name) {
                Some(existing) => existing,
                None => {
                    let parent_index = match bone.parent() {
                        None => -1,
                        Some(parent) => {
                            let parent_name = &source
                                .bones
                                .get(parent)
                                .ok_or_else(|| {
                                    MergeError::malformed(
                                        &source.name,
                                        format_args!(
                                            "bone '{}' has parent index {} out of range",
                                            bone.name, parent
                                        ),
                                    )
                                })?
                                .name;
                            let resolved = builder.bone_index(parent_name).ok_or_else(|| {
                                MergeError::malformed(
                                    &source.name,
                                    format_args!(
                                        "parent '{}' of bone '{}' is not stored before it",
                                        parent_name, bone.name
                                    ),
                                )
                            })?;
                            resolved as i32
                        }
                    };
                    builder.push_bone(Bone::new(
                        bone.name.clone(),
                        parent_index,
                        bone.local_position,
                        bone.local_rotation,
                    ))
                }
            };
            bones.push(index as u32);
        }

        let materials = source
            .materials
            .iter()
            .map(|material| builder.intern_material(material) as u32)
            .collect();
        let shapes = source
            .shapes
            .iter()
            .map(|shape| builder.intern_shape(shape) as u32)
            .collect();

        Ok(Self {
            source: source.name.clone(),
            bones,
            materials,
            shapes,
        })
    }

    fn lookup(&self, table: &[u32], index: u32, kind: &str) -> Result<u32, MergeError> {
        table.get(index as usize).copied().ok_or_else(|| {
            MergeError::malformed(
                &self.source,
                format_args!("{} index {} out of range ({} entries)", kind, index, table.len()),
            )
        })
    }

    pub fn bone(&self, index: u32) -> Result<u32, MergeError> {
        self.lookup(&self.bones, index, "bone")
    }

    pub fn material(&self, index: u32) -> Result<u32, MergeError> {
        self.lookup(&self.materials, index, "material")
    }

    pub fn shape(&self, index: u32) -> Result<u32, MergeError> {
        self.lookup(&self.shapes, index, "shape")
    }

    /// Copy `mesh` into accumulator space: indices rewritten through the
    /// tables, positions moved by `delta`, normals and shape deltas rotated.
    ///
    /// Tangents, colours and UVs are copied unchanged. Faces are copied as-is.
    pub fn remap_mesh(&self, mesh: &Mesh, delta: &RigidDelta) -> Result<Mesh, MergeError> {
        let mut out = Mesh::with_capacity(mesh.vertices.len(), mesh.faces.len());
        out.faces = mesh.faces.clone();
        out.material_indices = mesh
            .material_indices
            .iter()
            .map(|&m| self.material(m))
            .collect::<Result<_, _>>()?;

        for vertex in &mesh.vertices {
            let mut remapped = Vertex::new(
                delta.transform_point(vertex.position),
                delta.transform_vector(vertex.normal),
            );
            remapped.tangent = vertex.tangent;
            remapped.color = vertex.color;
            remapped.uvs = vertex.uvs.clone();
            remapped.weights = vertex
                .weights
                .iter()
                .map(|w| Ok(Weight::new(self.bone(w.bone_index)?, w.influence)))
                .collect::<Result<_, MergeError>>()?;
            remapped.shapes = vertex
                .shapes
                .iter()
                .map(|s| {
                    Ok(ShapeDelta::new(
                        self.shape(s.shape_index)?,
                        delta.transform_vector(s.delta),
                    ))
                })
                .collect::<Result<_, MergeError>>()?;
            out.vertices.push(remapped);
        }

        Ok(out)
    }
}
