// OBJ model loading
//
// Models are flattened to one vertex per face corner, so the index list
// is simply 0..n and attributes never need re-indexing.

use super::{resolve_asset_path, OBJECT_DIRS};
use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use std::io::BufReader;
use std::path::Path;

/// Flattened triangle geometry of a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryData {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// Empty when the file has no normals
    pub normals: Vec<Vec3>,
    /// Empty when the file has no texture coordinates. `v` is flipped.
    pub texture_coordinates: Vec<Vec2>,
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Load an OBJ file, searched in `assets/objects_vk/`, `assets/objects/`
/// and then as given.
pub fn load_model_geometry(name: impl AsRef<Path>) -> Result<GeometryData> {
    let path = resolve_asset_path(name, &OBJECT_DIRS)?;

    let (models, _materials) = tobj::load_obj(&path, &load_options())
        .with_context(|| format!("Failed to load OBJ file {:?}", path))?;

    let geometry = flatten_models(&models);
    log::info!(
        "Loaded {:?}: {} models, {} vertices",
        path,
        models.len(),
        geometry.positions.len()
    );
    Ok(geometry)
}

/// Parse OBJ source held in memory. Material libraries are ignored.
pub fn parse_model_geometry(source: &str) -> Result<GeometryData> {
    let mut reader = BufReader::new(source.as_bytes());
    let (models, _materials) =
        tobj::load_obj_buf(&mut reader, &load_options(), |_| Ok(Default::default()))
            .context("Failed to parse OBJ source")?;
    Ok(flatten_models(&models))
}

fn flatten_models(models: &[tobj::Model]) -> GeometryData {
    let mut data = GeometryData::default();

    for model in models {
        let mesh = &model.mesh;
        let has_normals = !mesh.normals.is_empty() && mesh.normal_indices.len() == mesh.indices.len();
        let has_texcoords =
            !mesh.texcoords.is_empty() && mesh.texcoord_indices.len() == mesh.indices.len();

        for (corner, &index) in mesh.indices.iter().enumerate() {
            let p = 3 * index as usize;
            data.positions.push(Vec3::new(
                mesh.positions[p],
                mesh.positions[p + 1],
                mesh.positions[p + 2],
            ));

            if has_normals {
                let n = 3 * mesh.normal_indices[corner] as usize;
                data.normals.push(Vec3::new(
                    mesh.normals[n],
                    mesh.normals[n + 1],
                    mesh.normals[n + 2],
                ));
            }

            if has_texcoords {
                let t = 2 * mesh.texcoord_indices[corner] as usize;
                data.texture_coordinates
                    .push(Vec2::new(mesh.texcoords[t], 1.0 - mesh.texcoords[t + 1]));
            }

            data.indices.push(data.indices.len() as u32);
        }
    }

    data
}
