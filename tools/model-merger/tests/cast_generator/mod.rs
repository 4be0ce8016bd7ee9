//! Programmatic Cast file generation for integration tests.
//!
//! Builds node trees directly with the format types instead of going through
//! the exporter, so the loader is exercised against independently built input.

use std::path::Path;

use glam::{Vec2, Vec3, Vec4};
use model_common::{CastFile, CastNode, CastNodeId, CastProperty};

/// One bone: name, parent index, local position
pub type BoneDef<'a> = (&'a str, i32, [f32; 3]);

/// A single-triangle mesh weighted fully to one bone
pub struct TriangleDef<'a> {
    pub bone: u32,
    pub material: &'a str,
    /// Offset applied to all three corners
    pub origin: [f32; 3],
    /// Optional (shape name, displacement of corner 0)
    pub shape: Option<(&'a str, [f32; 3])>,
}

pub struct RigDef<'a> {
    pub bones: &'a [BoneDef<'a>],
    pub triangles: &'a [TriangleDef<'a>],
}

fn hash(key: &str) -> u64 {
    // Any stable, distinct value works for cross references
    key.bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3))
}

/// Build a Cast file for `rig`
pub fn build_rig(name: &str, rig: &RigDef) -> CastFile {
    let mut root = CastNode::new(CastNodeId::Root);
    let model = root.add_node(CastNode::with_hash(CastNodeId::Model, hash(name)));

    let skeleton = model.add_node(CastNode::with_hash(
        CastNodeId::Skeleton,
        hash(&format!("{name}/skeleton")),
    ));
    for (bone_name, parent, position) in rig.bones {
        let bone = skeleton.add_node(CastNode::with_hash(
            CastNodeId::Bone,
            hash(&format!("{name}/{bone_name}")),
        ));
        bone.set_property("n", CastProperty::string(bone_name));
        bone.set_property("p", CastProperty::int(*parent));
        bone.set_property("lp", CastProperty::vector3(Vec3::from_array(*position)));
        bone.set_property("lr", CastProperty::vector4(Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }

    let mut materials: Vec<&str> = Vec::new();
    for triangle in rig.triangles {
        if !materials.contains(&triangle.material) {
            materials.push(triangle.material);
        }
    }

    for (index, triangle) in rig.triangles.iter().enumerate() {
        let origin = Vec3::from_array(triangle.origin);
        let positions = [origin, origin + Vec3::X, origin + Vec3::Y];
        let mesh_hash = hash(&format!("{name}/mesh/{index}"));

        let mesh = model.add_node(CastNode::with_hash(CastNodeId::Mesh, mesh_hash));
        mesh.set_property("vp", CastProperty::vector3s(&positions));
        mesh.set_property("vn", CastProperty::vector3s(&[Vec3::Z; 3]));
        mesh.set_property("ul", CastProperty::bytes(&[1]));
        mesh.set_property(
            "u0",
            CastProperty::vector2s(&[Vec2::ZERO, Vec2::X, Vec2::Y]),
        );
        mesh.set_property("mi", CastProperty::bytes(&[1]));
        mesh.set_property("wb", CastProperty::indices(&[triangle.bone; 3]));
        mesh.set_property("wv", CastProperty::floats(&[1.0; 3]));
        mesh.set_property("f", CastProperty::bytes(&[0, 1, 2]));
        mesh.set_property(
            "m",
            CastProperty::long(hash(&format!("{name}/material/{}", triangle.material))),
        );

        if let Some((shape_name, delta)) = triangle.shape {
            let shape = model.add_node(CastNode::with_hash(
                CastNodeId::BlendShape,
                hash(&format!("{name}/shape/{index}")),
            ));
            shape.set_property("n", CastProperty::string(shape_name));
            shape.set_property("b", CastProperty::long(mesh_hash));
            shape.set_property("vi", CastProperty::bytes(&[0]));
            shape.set_property(
                "vp",
                CastProperty::vector3s(&[positions[0] + Vec3::from_array(delta)]),
            );
        }
    }

    for material in materials {
        let node = model.add_node(CastNode::with_hash(
            CastNodeId::Material,
            hash(&format!("{name}/material/{material}")),
        ));
        node.set_property("n", CastProperty::string(material));
        node.set_property("t", CastProperty::string("pbr"));
    }

    CastFile::with_root(root)
}

/// Write `rig` to `dir/<name>.cast` and return the path
pub fn write_rig(dir: &Path, name: &str, rig: &RigDef) -> std::path::PathBuf {
    let path = dir.join(format!("{name}.cast"));
    let bytes = build_rig(name, rig)
        .to_bytes()
        .expect("Failed to encode test rig");
    std::fs::write(&path, bytes).expect("Failed to write test rig");
    path
}

/// Body: tag_origin -> j_spine (0, 1, 0) -> j_neck (0, 0.5, 0), one "skin" triangle
pub fn write_body(dir: &Path) -> std::path::PathBuf {
    write_rig(
        dir,
        "body",
        &RigDef {
            bones: &[
                ("tag_origin", -1, [0.0, 0.0, 0.0]),
                ("j_spine", 0, [0.0, 1.0, 0.0]),
                ("j_neck", 1, [0.0, 0.5, 0.0]),
            ],
            triangles: &[TriangleDef {
                bone: 1,
                material: "skin",
                origin: [0.0, 1.0, 0.0],
                shape: None,
            }],
        },
    )
}

/// Head: j_neck -> j_head (0, 0.2, 0), "skin" and "eyes" triangles, a "blink" shape
pub fn write_head(dir: &Path) -> std::path::PathBuf {
    write_rig(
        dir,
        "head",
        &RigDef {
            bones: &[("j_neck", -1, [0.0, 0.0, 0.0]), ("j_head", 0, [0.0, 0.2, 0.0])],
            triangles: &[
                TriangleDef {
                    bone: 1,
                    material: "skin",
                    origin: [0.0, 0.2, 0.0],
                    shape: None,
                },
                TriangleDef {
                    bone: 1,
                    material: "eyes",
                    origin: [0.0, 0.3, 0.1],
                    shape: Some(("blink", [0.0, -0.05, 0.0])),
                },
            ],
        },
    )
}

/// Hat: j_head -> j_hat (0, 0.1, 0), one "felt" triangle
pub fn write_hat(dir: &Path) -> std::path::PathBuf {
    write_rig(
        dir,
        "hat",
        &RigDef {
            bones: &[("j_head", -1, [0.0, 0.0, 0.0]), ("j_hat", 0, [0.0, 0.1, 0.0])],
            triangles: &[TriangleDef {
                bone: 1,
                material: "felt",
                origin: [0.0, 0.0, 0.0],
                shape: None,
            }],
        },
    )
}

/// Two rigs whose root bones each only exist in the other
pub fn write_cycle(dir: &Path) -> Vec<std::path::PathBuf> {
    vec![
        write_rig(
            dir,
            "left",
            &RigDef {
                bones: &[("j_a", -1, [0.0; 3]), ("j_b", 0, [0.0; 3])],
                triangles: &[],
            },
        ),
        write_rig(
            dir,
            "right",
            &RigDef {
                bones: &[("j_b", -1, [0.0; 3]), ("j_a", 0, [0.0; 3])],
                triangles: &[],
            },
        ),
    ]
}
