//! Root selection and splice ordering
//!
//! The resolver owns a [`ModelBuilder`] seeded from the chosen root model and
//! splices the remaining models into it one at a time. Input models are never
//! modified.

use hashbrown::HashMap;
use model_common::{Bone, Material, Model, RigidDelta, compute_delta, compute_global_poses};

use crate::{AttachmentGraph, MergeError, SpliceTables};

/// Accumulator for the merged model, with name lookups kept in step with the
/// ordered collections
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    model: Model,
    bones: HashMap<String, usize>,
    materials: HashMap<String, usize>,
    shapes: HashMap<String, usize>,
}

impl ModelBuilder {
    /// Seed from a copy of `root`
    pub fn from_root(root: &Model) -> Result<Self, MergeError> {
        let mut model = root.clone();
        compute_global_poses(&mut model.bones)
            .map_err(|err| MergeError::malformed(&root.name, err))?;

        let mut bones = HashMap::with_capacity(model.bones.len());
        for (index, bone) in model.bones.iter().enumerate() {
            bones.entry(bone.name.clone()).or_insert(index);
        }
        let mut materials = HashMap::with_capacity(model.materials.len());
        for (index, material) in model.materials.iter().enumerate() {
            materials.entry(material.name.clone()).or_insert(index);
        }
        let mut shapes = HashMap::with_capacity(model.shapes.len());
        for (index, shape) in model.shapes.iter().enumerate() {
            shapes.entry(shape.clone()).or_insert(index);
        }

        Ok(Self {
            model,
            bones,
            materials,
            shapes,
        })
    }

    pub fn has_bone(&self, name: &str) -> bool {
        self.bones.contains_key(name)
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.get(name).copied()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn finish(self) -> Model {
        self.model
    }

    /// Append a bone the builder does not have yet, returning its index
    pub(crate) fn push_bone(&mut self, bone: Bone) -> usize {
        let index = self.model.bones.len();
        self.bones.insert(bone.name.clone(), index);
        self.model.bones.push(bone);
        index
    }

    /// Index of the material with this name, appending it if new
    pub(crate) fn intern_material(&mut self, material: &Material) -> usize {
        if let Some(&index) = self.materials.get(material.name.as_str()) {
            return index;
        }
        let index = self.model.materials.len();
        self.materials.insert(material.name.clone(), index);
        self.model.materials.push(material.clone());
        index
    }

    /// Index of the shape with this name, appending it if new
    pub(crate) fn intern_shape(&mut self, shape: &str) -> usize {
        if let Some(&index) = self.shapes.get(shape) {
            return index;
        }
        let index = self.model.shapes.len();
        self.shapes.insert(shape.to_owned(), index);
        self.model.shapes.push(shape.to_owned());
        index
    }

    /// Splice one source model: bones, shapes and materials first, then every
    /// mesh moved by the rigid delta between the source root bone and its
    /// counterpart in the builder
    pub fn splice(&mut self, source: &Model) -> Result<(), MergeError> {
        let tables = SpliceTables::build(self, source)?;
        compute_global_poses(&mut self.model.bones)
            .map_err(|err| MergeError::malformed(&source.name, err))?;

        let delta = match source.root_bone() {
            Some(root) => {
                let target = self
                    .bone_index(&root.name)
                    .map(|index| &self.model.bones[index])
                    .ok_or_else(|| {
                        MergeError::malformed(
                            &source.name,
                            format_args!("root bone '{}' missing after splice", root.name),
                        )
                    })?;
                compute_delta(root, target)
            }
            // Boneless models sit at the scene origin
            None => RigidDelta::identity(),
        };

        for mesh in &source.meshes {
            let remapped = tables.remap_mesh(mesh, &delta)?;
            self.model.meshes.push(remapped);
        }

        Ok(())
    }
}

/// Index of the root model: the first model with bones whose root bone no
/// other model carries, else the first model
pub fn select_root(models: &[Model], graph: &AttachmentGraph) -> Result<usize, MergeError> {
    if models.is_empty() {
        return Err(MergeError::UnresolvableRoot("no models were loaded".to_string()));
    }

    Ok(models
        .iter()
        .enumerate()
        .find(|(index, model)| !model.bones.is_empty() && !graph.is_connectable(*index))
        .map_or(0, |(index, _)| index))
}

/// Merge every model into the selected root.
///
/// Each pass splices every pending model that is eligible: it has no bones,
/// the builder already carries its root bone, or no other pending model
/// could supply that bone. A pass that splices nothing is a stall.
pub fn merge_models(models: &[Model]) -> Result<Model, MergeError> {
    let graph = AttachmentGraph::build(models);
    let root = select_root(models, &graph)?;

    tracing::info!("Using {} as root model", models[root].name);

    let mut builder = ModelBuilder::from_root(&models[root])?;
    let mut pending = vec![true; models.len()];
    pending[root] = false;
    let mut remaining = models.len() - 1;

    while remaining > 0 {
        let mut progressed = false;

        for (index, model) in models.iter().enumerate() {
            if !pending[index] {
                continue;
            }

            let eligible = match model.root_bone() {
                None => true,
                Some(bone) => {
                    builder.has_bone(&bone.name) || !graph.connectable_among(index, &pending)
                }
            };
            if !eligible {
                continue;
            }

            tracing::info!("Merging {}", model.name);
            builder.splice(model)?;
            tracing::info!("Merged {}", model.name);

            pending[index] = false;
            remaining -= 1;
            progressed = true;
        }

        if !progressed {
            let models = models
                .iter()
                .zip(&pending)
                .filter(|(_, pending)| **pending)
                .map(|(model, _)| model.name.clone())
                .collect();
            return Err(MergeError::StalledMergeLoop { models });
        }
    }

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use model_common::{Face, Mesh, Vertex, Weight};

    fn skeleton(name: &str, bones: &[(&str, i32, Vec3)]) -> Model {
        let mut model = Model::new(name);
        for &(bone, parent, position) in bones {
            model
                .bones
                .push(Bone::new(bone, parent, position, Quat::IDENTITY));
        }
        model
    }

    fn triangle(weight_bone: u32, material: u32, y: f32) -> Mesh {
        let mut mesh = Mesh::default();
        for x in 0..3 {
            let mut vertex = Vertex::new(Vec3::new(x as f32, y, 0.0), Vec3::Z);
            vertex.weights.push(Weight::new(weight_bone, 1.0));
            mesh.vertices.push(vertex);
        }
        mesh.faces.push(Face::new(0, 1, 2));
        mesh.material_indices.push(material);
        mesh
    }

    fn resolved(mut model: Model) -> Model {
        model.resolve().unwrap();
        model
    }

    #[test]
    fn test_select_root_skips_connectable() {
        let models = vec![
            skeleton("arm", &[("j_shoulder", -1, Vec3::ZERO)]),
            skeleton("body", &[("tag_origin", -1, Vec3::ZERO), ("j_shoulder", 0, Vec3::ZERO)]),
        ];
        let graph = AttachmentGraph::build(&models);
        assert_eq!(select_root(&models, &graph).unwrap(), 1);
    }

    #[test]
    fn test_select_root_fallback_and_empty() {
        let models = vec![Model::new("prop"), Model::new("crate")];
        let graph = AttachmentGraph::build(&models);
        assert_eq!(select_root(&models, &graph).unwrap(), 0);

        assert!(matches!(
            select_root(&[], &AttachmentGraph::default()),
            Err(MergeError::UnresolvableRoot(_))
        ));
        assert!(matches!(
            merge_models(&[]),
            Err(MergeError::UnresolvableRoot(_))
        ));
    }

    #[test]
    fn test_rigid_delta_scenario() {
        let mut a = skeleton(
            "a",
            &[("Root", -1, Vec3::ZERO), ("Spine", 0, Vec3::new(0.0, 1.0, 0.0))],
        );
        a.materials.push(Material::new("skin"));
        let mut b = skeleton(
            "b",
            &[("Spine", -1, Vec3::ZERO), ("Hand", 0, Vec3::new(0.0, 1.0, 0.0))],
        );
        b.materials.push(Material::new("skin"));
        let mut mesh = Mesh::default();
        let mut vertex = Vertex::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        vertex.weights.push(Weight::new(1, 1.0));
        mesh.vertices.push(vertex);
        mesh.material_indices.push(0);
        b.meshes.push(mesh);

        let merged = merge_models(&[resolved(a), resolved(b)]).unwrap();

        let names: Vec<&str> = merged.bones.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["Root", "Spine", "Hand"]);
        assert_eq!(merged.bones[2].parent_index, 1);
        assert!(
            merged.bones[2]
                .global_position
                .abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5)
        );

        let vertex = &merged.meshes[0].vertices[0];
        assert!(vertex.position.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
        assert_eq!(vertex.weights, vec![Weight::new(2, 1.0)]);
        assert_eq!(merged.materials.len(), 1);
        assert_eq!(merged.meshes[0].material_indices, vec![0]);
    }

    #[test]
    fn test_disconnected_skeleton_spliced() {
        let body = skeleton("body", &[("tag_origin", -1, Vec3::ZERO)]);
        let mut weapon = skeleton("weapon", &[("tag_weapon", -1, Vec3::ZERO)]);
        let mut mesh = Mesh::default();
        let mut vertex = Vertex::new(Vec3::new(1.0, 0.0, 0.0), Vec3::Y);
        vertex.weights.push(Weight::new(0, 1.0));
        mesh.vertices.push(vertex);
        weapon.meshes.push(mesh);

        let merged = merge_models(&[resolved(body), resolved(weapon)]).unwrap();

        let names: Vec<&str> = merged.bones.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["tag_origin", "tag_weapon"]);
        assert_eq!(merged.bones[1].parent_index, -1);

        let vertex = &merged.meshes[0].vertices[0];
        assert!(vertex.position.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        assert_eq!(vertex.weights, vec![Weight::new(1, 1.0)]);
        assert_eq!(merged.validate(), Ok(()));
    }

    #[test]
    fn test_bone_superset_and_index_validity() {
        let mut body = skeleton(
            "body",
            &[
                ("tag_origin", -1, Vec3::ZERO),
                ("j_spine", 0, Vec3::new(0.0, 1.0, 0.0)),
                ("j_neck", 1, Vec3::new(0.0, 0.5, 0.0)),
            ],
        );
        body.materials.push(Material::new("skin"));
        body.meshes.push(triangle(1, 0, 0.0));

        let mut head = skeleton(
            "head",
            &[("j_neck", -1, Vec3::ZERO), ("j_head", 0, Vec3::new(0.0, 0.2, 0.0))],
        );
        head.materials.push(Material::new("eyes"));
        head.materials.push(Material::new("skin"));
        head.meshes.push(triangle(1, 0, 0.0));
        head.meshes.push(triangle(0, 1, 0.1));

        let mut hat = skeleton(
            "hat",
            &[("j_head", -1, Vec3::ZERO), ("j_hat", 0, Vec3::new(0.0, 0.1, 0.0))],
        );
        hat.materials.push(Material::new("felt"));
        hat.meshes.push(triangle(1, 0, 0.0));

        // Hat listed first so it has to wait for the head
        let models = vec![resolved(hat), resolved(head), resolved(body)];
        let merged = merge_models(&models).unwrap();

        let mut names: Vec<&str> = merged.bones.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            ["tag_origin", "j_spine", "j_neck", "j_head", "j_hat"]
        );
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), merged.bones.len());

        assert_eq!(merged.validate(), Ok(()));
        assert_eq!(merged.meshes.len(), 4);
        assert_eq!(merged.materials.len(), 3);
        // Both "skin" references land on the same index
        assert_eq!(merged.meshes[0].material_indices, vec![0]);
        assert_eq!(merged.meshes[2].material_indices, vec![0]);
        assert_eq!(merged.meshes[1].material_indices, vec![1]);

        // Hat geometry rides on j_head at (0, 1.7, 0)
        let hat_vertex = &merged.meshes[3].vertices[0];
        assert!(
            hat_vertex
                .position
                .abs_diff_eq(Vec3::new(0.0, 1.7, 0.0), 1e-5)
        );
        assert_eq!(hat_vertex.weights[0].bone_index, 4);
    }

    #[test]
    fn test_shape_dedup() {
        let mut a = skeleton("a", &[("root", -1, Vec3::ZERO)]);
        a.shapes = vec!["blink".to_string(), "smile".to_string()];
        let mut b = skeleton("b", &[("root", -1, Vec3::ZERO), ("jaw", 0, Vec3::ZERO)]);
        b.shapes = vec!["smile".to_string(), "frown".to_string()];

        let merged = merge_models(&[resolved(a), resolved(b)]).unwrap();
        assert_eq!(merged.shapes, ["blink", "smile", "frown"]);
    }

    #[test]
    fn test_single_model_unchanged() {
        let mut body = skeleton(
            "body",
            &[("tag_origin", -1, Vec3::ZERO), ("j_spine", 0, Vec3::Y)],
        );
        body.materials.push(Material::new("skin"));
        body.meshes.push(triangle(1, 0, 0.0));
        let body = resolved(body);

        assert_eq!(merge_models(std::slice::from_ref(&body)).unwrap(), body);
    }

    #[test]
    fn test_boneless_model_at_origin() {
        let body = skeleton("body", &[("tag_origin", -1, Vec3::new(5.0, 0.0, 0.0))]);
        let mut prop = Model::new("prop");
        prop.materials.push(Material::new("metal"));
        let mut mesh = triangle(0, 0, 0.0);
        mesh.vertices.iter_mut().for_each(|v| v.weights.clear());
        prop.meshes.push(mesh);

        let merged = merge_models(&[resolved(body), resolved(prop)]).unwrap();
        assert_eq!(merged.name, "body");
        assert_eq!(merged.meshes[0].vertices[1].position, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_cycle_stalls() {
        let body = skeleton("body", &[("tag_origin", -1, Vec3::ZERO)]);
        let left = skeleton("left", &[("j_a", -1, Vec3::ZERO), ("j_b", 0, Vec3::ZERO)]);
        let right = skeleton("right", &[("j_b", -1, Vec3::ZERO), ("j_a", 0, Vec3::ZERO)]);

        let err = merge_models(&[resolved(body), resolved(left), resolved(right)]).unwrap_err();
        match err {
            MergeError::StalledMergeLoop { models } => assert_eq!(models, ["left", "right"]),
            other => panic!("unexpected error: {}", other),
        }
    }
}
