//! Cast adapter (.cast -> Model)
//!
//! Reads the first model node under the first root node. Blend shape nodes are
//! attached to meshes through their base-shape hash; their absolute target
//! positions are converted back into displacements from the base vertex.

use anyhow::{Context, Result, bail, ensure};
use glam::{Quat, Vec2, Vec3, Vec4};
use hashbrown::HashMap;
use model_common::{
    Bone, CastFile, CastNode, CastNodeId, Face, Material, Mesh, Model, ShapeDelta, Vertex, Weight,
};

use crate::export::prop;

pub fn parse(name: &str, data: &[u8]) -> Result<Model> {
    let file = CastFile::from_bytes(data)?;
    let root = file.roots.first().context("Cast file has no root node")?;
    let cast_model = root
        .children_of(CastNodeId::Model)
        .next()
        .context("No model found in Cast file")?;

    let mut model = Model::new(name);

    if let Some(skeleton) = cast_model.children_of(CastNodeId::Skeleton).next() {
        for (index, bone) in skeleton.children_of(CastNodeId::Bone).enumerate() {
            model.bones.push(read_bone(bone, index)?);
        }
    }

    let material_hashes: HashMap<u64, u32> = cast_model
        .children_of(CastNodeId::Material)
        .enumerate()
        .map(|(index, material)| (material.hash, index as u32))
        .collect();
    for (index, material) in cast_model.children_of(CastNodeId::Material).enumerate() {
        let material_name = material
            .string_property(prop::NAME)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("material_{}", index));
        model.materials.push(Material::new(material_name));
    }

    let blend_shapes: Vec<&CastNode> = cast_model.children_of(CastNodeId::BlendShape).collect();
    for shape in &blend_shapes {
        let shape_name = shape
            .string_property(prop::NAME)
            .context("Blend shape has no name")?;
        if model.shape_index(shape_name).is_none() {
            model.shapes.push(shape_name.to_owned());
        }
    }

    for (index, cast_mesh) in cast_model.children_of(CastNodeId::Mesh).enumerate() {
        let mut mesh = read_mesh(cast_mesh, &material_hashes)
            .with_context(|| format!("Failed to read mesh {}", index))?;

        for shape in blend_shapes
            .iter()
            .filter(|s| s.property(prop::BASE_SHAPE).and_then(|p| p.first_u64()) == Some(cast_mesh.hash))
        {
            apply_blend_shape(&model, &mut mesh, shape)
                .with_context(|| format!("Failed to apply blend shape to mesh {}", index))?;
        }

        model.meshes.push(mesh);
    }

    Ok(model)
}

fn read_bone(node: &CastNode, index: usize) -> Result<Bone> {
    let name = node
        .string_property(prop::NAME)
        .with_context(|| format!("Bone {} has no name", index))?;
    let parent = node
        .property(prop::PARENT_INDEX)
        .and_then(|p| p.first_integer())
        .unwrap_or(-1);
    let parent = i32::try_from(parent)
        .with_context(|| format!("Bone '{}' parent index {} out of range", name, parent))?;

    let position = node
        .property(prop::LOCAL_POSITION)
        .and_then(|p| p.vector3s_values())
        .and_then(|v| v.first().copied())
        .unwrap_or(Vec3::ZERO);
    let rotation = node
        .property(prop::LOCAL_ROTATION)
        .and_then(|p| p.vector4s_values())
        .and_then(|v| v.first().copied())
        .map(|v| Quat::from_xyzw(v.x, v.y, v.z, v.w))
        .unwrap_or(Quat::IDENTITY);

    Ok(Bone::new(name, parent, position, rotation))
}

/// Optional per-vertex attribute that must match the vertex count if present
fn per_vertex<T>(values: Option<Vec<T>>, count: usize, what: &str) -> Result<Option<Vec<T>>> {
    match values {
        Some(values) if values.len() != count => bail!(
            "{} buffer has {} entries, expected {}",
            what,
            values.len(),
            count
        ),
        other => Ok(other),
    }
}

fn read_mesh(node: &CastNode, material_hashes: &HashMap<u64, u32>) -> Result<Mesh> {
    let positions = node
        .property(prop::POSITIONS)
        .and_then(|p| p.vector3s_values())
        .context("Mesh has no vertex positions")?;
    let count = positions.len();

    let normals = per_vertex(
        node.property(prop::NORMALS).and_then(|p| p.vector3s_values()),
        count,
        "Normal",
    )?;
    let tangents = per_vertex(
        node.property(prop::TANGENTS).and_then(|p| {
            p.vector3s_values()
                .or_else(|| p.vector4s_values().map(|v| v.into_iter().map(Vec4::truncate).collect()))
        }),
        count,
        "Tangent",
    )?;
    let colors = per_vertex(
        node.property(prop::COLOR_LAYER_0)
            .and_then(|p| p.vector4s_values())
            .or_else(|| {
                node.property(prop::PACKED_COLORS)
                    .and_then(|p| p.integers())
                    .map(|v| v.into_iter().map(|c| unpack_rgba(c as u32)).collect())
            }),
        count,
        "Colour",
    )?;

    let uv_layers = node
        .property(prop::UV_LAYER_COUNT)
        .and_then(|p| p.first_integer())
        .unwrap_or(0)
        .max(0) as usize;
    // Each layer is its own property
    let mut uvs: Vec<Vec<Vec2>> = Vec::with_capacity(uv_layers.min(node.properties.len()));
    for layer in 0..uv_layers {
        let key = prop::uv_layer(layer);
        let values = node
            .property(&key)
            .and_then(|p| p.vector2s_values())
            .with_context(|| format!("Missing UV layer {}", layer))?;
        uvs.push(per_vertex(Some(values), count, &key)?.unwrap_or_default());
    }

    let influence = node
        .property(prop::MAX_INFLUENCE)
        .and_then(|p| p.first_integer())
        .unwrap_or(0)
        .max(0) as usize;
    let (weight_bones, weight_values) = if influence > 0 {
        let expected = count
            .checked_mul(influence)
            .with_context(|| format!("Max influence {} is out of range", influence))?;
        let bones = node
            .property(prop::WEIGHT_BONES)
            .and_then(|p| p.indices_u32())
            .context("Mesh declares weights but has no weight bone buffer")?;
        let values = node
            .property(prop::WEIGHT_VALUES)
            .and_then(|p| p.floats_f32())
            .context("Mesh declares weights but has no weight value buffer")?;
        ensure!(
            bones.len() == expected && values.len() == expected,
            "Weight buffers hold {} bones and {} values, expected {} each",
            bones.len(),
            values.len(),
            expected
        );
        (bones, values)
    } else {
        (Vec::new(), Vec::new())
    };

    let face_indices = node
        .property(prop::FACES)
        .and_then(|p| p.indices_u32())
        .unwrap_or_default();
    ensure!(
        face_indices.len() % 3 == 0,
        "Face buffer length {} is not a multiple of 3",
        face_indices.len()
    );

    let mut mesh = Mesh::with_capacity(count, face_indices.len() / 3);

    if let Some(indices) = node
        .property(prop::MATERIAL_INDICES)
        .and_then(|p| p.indices_u32())
    {
        mesh.material_indices = indices;
    } else if let Some(hash) = node.property(prop::MATERIAL).and_then(|p| p.first_u64()) {
        match material_hashes.get(&hash) {
            Some(&index) => mesh.material_indices.push(index),
            None => tracing::warn!("Mesh references unknown material hash 0x{:016X}", hash),
        }
    }

    for (i, &position) in positions.iter().enumerate() {
        let normal = normals.as_ref().map_or(Vec3::ZERO, |n| n[i]);
        let mut vertex = Vertex::new(position, normal);
        if let Some(tangents) = &tangents {
            vertex.tangent = tangents[i];
        }
        if let Some(colors) = &colors {
            vertex.color = colors[i];
        }
        vertex.uvs = uvs.iter().map(|layer| layer[i]).collect();

        let start = i * influence;
        for j in start..start + influence {
            // Padding slots carry zero influence
            if weight_values[j] != 0.0 {
                vertex.weights.push(Weight::new(weight_bones[j], weight_values[j]));
            }
        }

        mesh.vertices.push(vertex);
    }

    for face in face_indices.chunks_exact(3) {
        mesh.faces.push(Face::new(face[0], face[1], face[2]));
    }

    Ok(mesh)
}

fn apply_blend_shape(model: &Model, mesh: &mut Mesh, node: &CastNode) -> Result<()> {
    let shape_name = node
        .string_property(prop::NAME)
        .context("Blend shape has no name")?;
    let shape_index = model
        .shape_index(shape_name)
        .with_context(|| format!("Blend shape '{}' was not registered", shape_name))?
        as u32;

    let indices = node
        .property(prop::TARGET_INDICES)
        .and_then(|p| p.indices_u32())
        .with_context(|| format!("Blend shape '{}' has no vertex indices", shape_name))?;
    let targets = node
        .property(prop::POSITIONS)
        .and_then(|p| p.vector3s_values())
        .with_context(|| format!("Blend shape '{}' has no target positions", shape_name))?;
    ensure!(
        indices.len() == targets.len(),
        "Blend shape '{}' has {} indices but {} positions",
        shape_name,
        indices.len(),
        targets.len()
    );

    let vertex_count = mesh.vertices.len();
    for (&index, &target) in indices.iter().zip(&targets) {
        let vertex = mesh.vertices.get_mut(index as usize).with_context(|| {
            format!(
                "Blend shape '{}' targets vertex {} of {}",
                shape_name, index, vertex_count
            )
        })?;
        vertex
            .shapes
            .push(ShapeDelta::new(shape_index, target - vertex.position));
    }

    Ok(())
}

/// RGBA8 packed little-endian into a u32, normalised to 0-1
fn unpack_rgba(packed: u32) -> Vec4 {
    let [r, g, b, a] = packed.to_le_bytes();
    Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
}
