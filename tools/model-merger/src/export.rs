//! Model -> Cast scene graph
//!
//! Node hashes are `xxh3_64` digests of a path-like key (`<model>/mesh/3`), so
//! the same model always encodes to the same bytes. The root node hash is 0.
//!
//! Blend shapes are written with absolute target positions (`vp`); the model
//! keeps displacements, so the encoder adds the base vertex position back in.

use anyhow::Result;
use glam::{Vec3, Vec4};
use model_common::{CastFile, CastNode, CastNodeId, CastProperty, Mesh, Model};
use xxhash_rust::xxh3::xxh3_64;

/// Property names used by the Cast model convention
pub(crate) mod prop {
    pub const NAME: &str = "n";
    pub const PARENT_INDEX: &str = "p";
    pub const LOCAL_POSITION: &str = "lp";
    pub const LOCAL_ROTATION: &str = "lr";
    pub const WORLD_POSITION: &str = "wp";
    pub const WORLD_ROTATION: &str = "wr";

    pub const POSITIONS: &str = "vp";
    pub const NORMALS: &str = "vn";
    pub const TANGENTS: &str = "vt";
    pub const COLOR_LAYER_COUNT: &str = "cl";
    pub const COLOR_LAYER_0: &str = "c0";
    /// Legacy packed RGBA8 colours, read only
    pub const PACKED_COLORS: &str = "vc";
    pub const UV_LAYER_COUNT: &str = "ul";
    pub const MAX_INFLUENCE: &str = "mi";
    pub const WEIGHT_BONES: &str = "wb";
    pub const WEIGHT_VALUES: &str = "wv";
    pub const FACES: &str = "f";
    pub const MATERIAL: &str = "m";
    pub const MATERIAL_INDICES: &str = "mm";

    pub const MATERIAL_TYPE: &str = "t";

    pub const BASE_SHAPE: &str = "b";
    pub const TARGET_INDICES: &str = "vi";
    pub const TARGET_SCALE: &str = "ts";

    pub fn uv_layer(layer: usize) -> String {
        format!("u{}", layer)
    }
}

fn node_hash(key: &str) -> u64 {
    xxh3_64(key.as_bytes())
}

/// Build the Cast node tree for `model`
pub fn model_to_cast(model: &Model) -> CastFile {
    let mut root = CastNode::new(CastNodeId::Root);
    let cast_model = root.add_node(CastNode::with_hash(
        CastNodeId::Model,
        node_hash(&format!("{}/model", model.name)),
    ));
    cast_model.set_property(prop::NAME, CastProperty::string(&model.name));

    let skeleton = cast_model.add_node(CastNode::with_hash(
        CastNodeId::Skeleton,
        node_hash(&format!("{}/skeleton", model.name)),
    ));
    for (index, bone) in model.bones.iter().enumerate() {
        let node = skeleton.add_node(CastNode::with_hash(
            CastNodeId::Bone,
            node_hash(&format!("{}/bone/{}", model.name, index)),
        ));
        node.set_property(prop::NAME, CastProperty::string(&bone.name));
        node.set_property(prop::PARENT_INDEX, CastProperty::int(bone.parent_index));
        node.set_property(prop::LOCAL_POSITION, CastProperty::vector3(bone.local_position));
        node.set_property(
            prop::LOCAL_ROTATION,
            CastProperty::vector4(Vec4::from_array(bone.local_rotation.to_array())),
        );
        node.set_property(prop::WORLD_POSITION, CastProperty::vector3(bone.global_position));
        node.set_property(
            prop::WORLD_ROTATION,
            CastProperty::vector4(Vec4::from_array(bone.global_rotation.to_array())),
        );
    }

    let material_hashes: Vec<u64> = (0..model.materials.len())
        .map(|index| node_hash(&format!("{}/material/{}", model.name, index)))
        .collect();
    let mesh_hashes: Vec<u64> = (0..model.meshes.len())
        .map(|index| node_hash(&format!("{}/mesh/{}", model.name, index)))
        .collect();

    for (mesh, &hash) in model.meshes.iter().zip(&mesh_hashes) {
        cast_model.add_node(mesh_node(mesh, hash, &material_hashes));
    }

    for (material, &hash) in model.materials.iter().zip(&material_hashes) {
        let node = cast_model.add_node(CastNode::with_hash(CastNodeId::Material, hash));
        node.set_property(prop::NAME, CastProperty::string(&material.name));
        node.set_property(prop::MATERIAL_TYPE, CastProperty::string("pbr"));
    }

    for (mesh_index, mesh) in model.meshes.iter().enumerate() {
        for (shape_index, shape) in model.shapes.iter().enumerate() {
            let mut indices = Vec::new();
            let mut targets = Vec::new();
            for (vertex_index, vertex) in mesh.vertices.iter().enumerate() {
                if let Some(delta) = vertex
                    .shapes
                    .iter()
                    .find(|s| s.shape_index as usize == shape_index)
                {
                    indices.push(vertex_index as u32);
                    targets.push(vertex.position + delta.delta);
                }
            }
            if indices.is_empty() {
                continue;
            }

            let node = cast_model.add_node(CastNode::with_hash(
                CastNodeId::BlendShape,
                node_hash(&format!(
                    "{}/shape/{}/{}",
                    model.name, mesh_index, shape_index
                )),
            ));
            node.set_property(prop::NAME, CastProperty::string(shape));
            node.set_property(prop::BASE_SHAPE, CastProperty::long(mesh_hashes[mesh_index]));
            node.set_property(prop::TARGET_INDICES, CastProperty::indices(&indices));
            node.set_property(prop::POSITIONS, CastProperty::vector3s(&targets));
            node.set_property(prop::TARGET_SCALE, CastProperty::float(1.0));
        }
    }

    CastFile::with_root(root)
}

fn mesh_node(mesh: &Mesh, hash: u64, material_hashes: &[u64]) -> CastNode {
    let mut node = CastNode::with_hash(CastNodeId::Mesh, hash);
    let count = mesh.vertices.len();

    let positions: Vec<Vec3> = mesh.vertices.iter().map(|v| v.position).collect();
    let normals: Vec<Vec3> = mesh.vertices.iter().map(|v| v.normal).collect();
    let colors: Vec<Vec4> = mesh.vertices.iter().map(|v| v.color).collect();
    node.set_property(prop::POSITIONS, CastProperty::vector3s(&positions));
    node.set_property(prop::NORMALS, CastProperty::vector3s(&normals));
    node.set_property(prop::COLOR_LAYER_COUNT, CastProperty::indices(&[1]));
    node.set_property(prop::COLOR_LAYER_0, CastProperty::vector4s(&colors));

    if mesh.vertices.iter().any(|v| v.tangent != Vec3::ZERO) {
        let tangents: Vec<Vec3> = mesh.vertices.iter().map(|v| v.tangent).collect();
        node.set_property(prop::TANGENTS, CastProperty::vector3s(&tangents));
    }

    let layers = mesh.uv_layer_count();
    node.set_property(prop::UV_LAYER_COUNT, CastProperty::indices(&[layers as u32]));
    for layer in 0..layers {
        let uvs: Vec<_> = mesh
            .vertices
            .iter()
            .map(|v| v.uvs.get(layer).copied().unwrap_or_default())
            .collect();
        node.set_property(prop::uv_layer(layer), CastProperty::vector2s(&uvs));
    }

    let influence = mesh.max_influence();
    node.set_property(prop::MAX_INFLUENCE, CastProperty::indices(&[influence as u32]));
    if influence > 0 {
        let mut bones = vec![0u32; count * influence];
        let mut values = vec![0f32; count * influence];
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            for (j, weight) in vertex.weights.iter().enumerate() {
                bones[i * influence + j] = weight.bone_index;
                values[i * influence + j] = weight.influence;
            }
        }
        node.set_property(prop::WEIGHT_BONES, CastProperty::indices(&bones));
        node.set_property(prop::WEIGHT_VALUES, CastProperty::floats(&values));
    }

    let faces: Vec<u32> = mesh.faces.iter().flat_map(|f| f.indices).collect();
    node.set_property(prop::FACES, CastProperty::indices(&faces));

    if let Some(hash) = mesh
        .material_indices
        .first()
        .and_then(|&m| material_hashes.get(m as usize))
    {
        node.set_property(prop::MATERIAL, CastProperty::long(*hash));
    }
    if !mesh.material_indices.is_empty() {
        let indices: Vec<i32> = mesh.material_indices.iter().map(|&m| m as i32).collect();
        node.set_property(prop::MATERIAL_INDICES, CastProperty::ints(&indices));
    }

    node
}

/// Encode `model` as a complete Cast file in memory
pub fn encode_model(model: &Model) -> Result<Vec<u8>> {
    model_to_cast(model).to_bytes()
}
