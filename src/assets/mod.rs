// Asset lookup and loaders
//
// Shaders and models are looked up in a legacy directory first (with a
// warning), then in the regular assets directory, then as given.

pub mod dds;
pub mod obj;

pub use dds::{DdsError, DdsImage, ImageInfo};
pub use obj::{load_model_geometry, parse_model_geometry, GeometryData};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Search directories for one kind of asset
#[derive(Debug, Clone, Copy)]
pub struct AssetDirs {
    /// Still searched first, but files found here trigger a warning
    pub legacy: &'static str,
    pub preferred: &'static str,
}

pub const SHADER_DIRS: AssetDirs = AssetDirs {
    legacy: "assets/shaders_vk",
    preferred: "assets/shaders",
};

pub const OBJECT_DIRS: AssetDirs = AssetDirs {
    legacy: "assets/objects_vk",
    preferred: "assets/objects",
};

/// Resolve `name` relative to the working directory
pub fn resolve_asset_path(name: impl AsRef<Path>, dirs: &AssetDirs) -> Result<PathBuf> {
    resolve_asset_path_in(Path::new(""), name, dirs)
}

/// Resolve `name` against `root/<legacy>`, `root/<preferred>` and finally
/// `name` itself.
pub fn resolve_asset_path_in(
    root: &Path,
    name: impl AsRef<Path>,
    dirs: &AssetDirs,
) -> Result<PathBuf> {
    let name = name.as_ref();

    if name.is_absolute() {
        if name.is_file() {
            return Ok(name.to_path_buf());
        }
        anyhow::bail!("Unable to find {:?}", name);
    }

    let legacy = root.join(dirs.legacy).join(name);
    if legacy.is_file() {
        log::warn!(
            "Loading asset from {:?}, consider storing it in {:?}",
            legacy,
            root.join(dirs.preferred)
        );
        return Ok(legacy);
    }

    let preferred = root.join(dirs.preferred).join(name);
    if preferred.is_file() {
        log::info!("Loading asset from {:?}", preferred);
        return Ok(preferred);
    }

    let direct = root.join(name);
    if direct.is_file() {
        log::info!("Loading asset from {:?}", direct);
        return Ok(direct);
    }

    anyhow::bail!(
        "Unable to find {:?} (searched {:?}, {:?} and the path itself)",
        name,
        root.join(dirs.legacy),
        root.join(dirs.preferred)
    )
}
