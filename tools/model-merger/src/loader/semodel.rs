//! SEModel adapter (.semodel -> Model)
//!
//! # Layout (version 1, little-endian)
//! ```text
//! Header
//! 0x00: magic [u8; 7] ("SEModel")
//! 0x07: version u16 (1)
//! 0x09: header_size u16
//! 0x0B: data_flags u8 (bones, meshes, materials)
//! 0x0C: bone_flags u8 (world, local, scales)
//! 0x0D: mesh_flags u8 (uvs, normals, colors, weights)
//! 0x0E: bone_count u32
//! 0x12: mesh_count u32
//! 0x16: material_count u32
//! 0x1A: reserved [u8; 3]
//!
//! bone names: bone_count null-terminated strings
//! bones: flags u8, parent i32, [world pos vec3 + rot quat],
//!        [local pos vec3 + rot quat], [scale vec3]
//! meshes: flags u8, material_count u8, max_influence u8,
//!         vertex_count u32, face_count u32, then per-attribute blocks
//! materials: name cstr, is_simple u8, [3 texture cstrs]
//! ```
//!
//! Weight bone indices and face indices use the narrowest integer width that
//! can address the bone and vertex counts respectively.

use anyhow::{Context, Result, ensure};
use glam::{Quat, Vec3, Vec4};
use model_common::{Bone, ByteReader, Face, Material, Mesh, Model, Vertex, Weight};

const MAGIC: &[u8; 7] = b"SEModel";
const VERSION: u16 = 1;

mod data_flags {
    pub const BONES: u8 = 1 << 0;
    pub const MESHES: u8 = 1 << 1;
    pub const MATERIALS: u8 = 1 << 2;
}

mod bone_flags {
    pub const WORLD: u8 = 1 << 0;
    pub const LOCAL: u8 = 1 << 1;
    pub const SCALES: u8 = 1 << 2;
}

mod mesh_flags {
    pub const UVS: u8 = 1 << 0;
    pub const NORMALS: u8 = 1 << 1;
    pub const COLORS: u8 = 1 << 2;
    pub const WEIGHTS: u8 = 1 << 3;
}

struct Header {
    data_flags: u8,
    bone_flags: u8,
    mesh_flags: u8,
    bone_count: u32,
    mesh_count: u32,
    material_count: u32,
}

impl Header {
    fn read(reader: &mut ByteReader) -> Result<Self> {
        let magic = reader.take(MAGIC.len()).context("File too small for header")?;
        ensure!(magic == MAGIC, "Invalid SEModel magic");
        let version = reader.read_u16()?;
        ensure!(version == VERSION, "Unsupported SEModel version: {}", version);
        let _header_size = reader.read_u16()?;

        let header = Self {
            data_flags: reader.read_u8()?,
            bone_flags: reader.read_u8()?,
            mesh_flags: reader.read_u8()?,
            bone_count: reader.read_u32()?,
            mesh_count: reader.read_u32()?,
            material_count: reader.read_u32()?,
        };
        reader.skip(3)?;
        Ok(header)
    }

    fn has(&self, flag: u8) -> bool {
        self.data_flags & flag != 0
    }
}

/// Read an index stored with the narrowest width able to address `count` items
fn read_sized_index(reader: &mut ByteReader, count: u32) -> Result<u32> {
    if count <= u32::from(u8::MAX) {
        reader.read_u8().map(u32::from)
    } else if count <= u32::from(u16::MAX) {
        reader.read_u16().map(u32::from)
    } else {
        reader.read_u32()
    }
}

pub fn parse(name: &str, data: &[u8]) -> Result<Model> {
    let mut reader = ByteReader::new(data);
    let header = Header::read(&mut reader)?;

    let mut model = Model::new(name);

    if header.has(data_flags::BONES) {
        read_bones(&mut reader, &header, &mut model).context("Failed to read bones")?;
    }

    if header.has(data_flags::MESHES) {
        for index in 0..header.mesh_count {
            let mesh = read_mesh(&mut reader, &header)
                .with_context(|| format!("Failed to read mesh {}", index))?;
            model.meshes.push(mesh);
        }
    }

    if header.has(data_flags::MATERIALS) {
        for _ in 0..header.material_count {
            let material_name = reader.read_cstr()?;
            let is_simple = reader.read_u8()? != 0;
            if is_simple {
                // Diffuse, normal and specular maps are not carried over
                for _ in 0..3 {
                    reader.read_cstr()?;
                }
            }
            model.materials.push(Material::new(material_name));
        }
    }

    Ok(model)
}

fn read_bones(reader: &mut ByteReader, header: &Header, model: &mut Model) -> Result<()> {
    let count = header.bone_count as usize;
    // Each name takes at least its terminator
    let mut names = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        names.push(reader.read_cstr()?);
    }

    let mut world: Vec<(Vec3, Quat)> = Vec::with_capacity(names.len());

    for name in names {
        let _flags = reader.read_u8()?;
        let parent = reader.read_i32()?;

        let world_pose = if header.bone_flags & bone_flags::WORLD != 0 {
            Some((reader.read_vec3()?, reader.read_quat()?))
        } else {
            None
        };
        let local_pose = if header.bone_flags & bone_flags::LOCAL != 0 {
            Some((reader.read_vec3()?, reader.read_quat()?))
        } else {
            None
        };
        if header.bone_flags & bone_flags::SCALES != 0 {
            reader.read_vec3()?;
        }

        let parent_world = usize::try_from(parent)
            .ok()
            .and_then(|p| world.get(p).copied());

        let (local_position, local_rotation) = match (local_pose, world_pose, parent_world) {
            (Some(local), _, _) => local,
            (None, Some((position, rotation)), Some((parent_position, parent_rotation))) => {
                let inverse = parent_rotation.inverse();
                (inverse * (position - parent_position), inverse * rotation)
            }
            (None, Some(pose), None) => pose,
            (None, None, _) => (Vec3::ZERO, Quat::IDENTITY),
        };

        let world_pose = world_pose.unwrap_or_else(|| match parent_world {
            Some((parent_position, parent_rotation)) => (
                parent_position + parent_rotation * local_position,
                parent_rotation * local_rotation,
            ),
            None => (local_position, local_rotation),
        });
        world.push(world_pose);

        model
            .bones
            .push(Bone::new(name, parent, local_position, local_rotation));
    }

    Ok(())
}

fn read_mesh(reader: &mut ByteReader, header: &Header) -> Result<Mesh> {
    let _flags = reader.read_u8()?;
    let layers = reader.read_u8()? as usize;
    let influence = reader.read_u8()? as usize;
    let vertex_count = reader.read_u32()?;
    let face_count = reader.read_u32()?;

    // Capacity is capped by what the remaining bytes could hold: 12 bytes per
    // position, 3 bytes per face at the narrowest index width
    let mut mesh = Mesh::with_capacity(
        (vertex_count as usize).min(reader.remaining() / 12),
        (face_count as usize).min(reader.remaining() / 3),
    );

    for _ in 0..vertex_count {
        mesh.vertices
            .push(Vertex::new(reader.read_vec3()?, Vec3::ZERO));
    }

    if header.mesh_flags & mesh_flags::UVS != 0 {
        for vertex in &mut mesh.vertices {
            for _ in 0..layers {
                vertex.uvs.push(reader.read_vec2()?);
            }
        }
    }

    if header.mesh_flags & mesh_flags::NORMALS != 0 {
        for vertex in &mut mesh.vertices {
            vertex.normal = reader.read_vec3()?;
        }
    }

    if header.mesh_flags & mesh_flags::COLORS != 0 {
        for vertex in &mut mesh.vertices {
            let rgba = reader.take(4)?;
            vertex.color =
                Vec4::new(rgba[0] as f32, rgba[1] as f32, rgba[2] as f32, rgba[3] as f32) / 255.0;
        }
    }

    if header.mesh_flags & mesh_flags::WEIGHTS != 0 {
        for vertex in &mut mesh.vertices {
            for _ in 0..influence {
                let bone = read_sized_index(reader, header.bone_count)?;
                let value = reader.read_f32()?;
                if value != 0.0 {
                    vertex.weights.push(Weight::new(bone, value));
                }
            }
        }
    }

    for _ in 0..face_count {
        let a = read_sized_index(reader, vertex_count)?;
        let b = read_sized_index(reader, vertex_count)?;
        let c = read_sized_index(reader, vertex_count)?;
        mesh.faces.push(Face::new(a, b, c));
    }

    for _ in 0..layers {
        let material = reader.read_i32()?;
        // -1 marks an unassigned layer
        if let Ok(material) = u32::try_from(material) {
            mesh.material_indices.push(material);
        }
    }

    Ok(mesh)
}
