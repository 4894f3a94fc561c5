// Shader module loading
//
// Vulkan consumes SPIR-V. Shaders come from `.spv` files, SPIR-V words
// already in memory, or GLSL which is compiled at runtime when the
// `shaderc` feature is enabled.

use super::VulkanDevice;
use crate::assets::{resolve_asset_path, SHADER_DIRS};
use anyhow::{Context, Result};
use ash::vk;
use std::path::{Path, PathBuf};

/// Where a shader's code comes from
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// Looked up in `assets/shaders_vk/`, `assets/shaders/`, then as given.
    /// `.spv` files are SPIR-V, anything else is GLSL.
    File(PathBuf),
    /// GLSL source; `name` shows up in compiler messages
    Glsl { name: String, code: String },
    Spirv(Vec<u32>),
}

impl ShaderSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn glsl(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Glsl {
            name: name.into(),
            code: code.into(),
        }
    }

    /// SPIR-V words for the given stage
    pub fn load(&self, stage: vk::ShaderStageFlags) -> Result<Vec<u32>> {
        match self {
            Self::File(name) => {
                let path = resolve_asset_path(name, &SHADER_DIRS)?;
                if is_spirv_file(&path) {
                    read_spirv_file(&path)
                } else {
                    let code = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read shader {:?}", path))?;
                    compile_glsl(&code, &path.to_string_lossy(), stage)
                }
            }
            Self::Glsl { name, code } => compile_glsl(code, name, stage),
            Self::Spirv(words) => Ok(words.clone()),
        }
    }
}

fn is_spirv_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("spv"))
}

fn read_spirv_file(path: &Path) -> Result<Vec<u32>> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("Failed to open shader {:?}", path))?;
    ash::util::read_spv(&mut file).with_context(|| format!("Invalid SPIR-V in {:?}", path))
}

/// Decode SPIR-V from bytes, e.g. from `include_bytes!`
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut std::io::Cursor::new(bytes)).context("Invalid SPIR-V")
}

#[cfg(feature = "shaderc")]
fn compile_glsl(code: &str, name: &str, stage: vk::ShaderStageFlags) -> Result<Vec<u32>> {
    let kind = shader_kind(stage)?;
    let compiler = shaderc::Compiler::new().context("Failed to initialize shaderc")?;
    let mut options = shaderc::CompileOptions::new().context("Failed to create shaderc options")?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_1 as u32,
    );

    let artifact = compiler
        .compile_into_spirv(code, kind, name, "main", Some(&options))
        .map_err(|e| anyhow::anyhow!("Failed to compile {}: {}", name, e))?;

    if artifact.get_num_warnings() > 0 {
        log::warn!("{}: {}", name, artifact.get_warning_messages());
    }
    Ok(artifact.as_binary().to_vec())
}

#[cfg(not(feature = "shaderc"))]
fn compile_glsl(_code: &str, name: &str, _stage: vk::ShaderStageFlags) -> Result<Vec<u32>> {
    anyhow::bail!(
        "Cannot compile GLSL shader {}: built without the `shaderc` feature, use a .spv file",
        name
    )
}

#[cfg(feature = "shaderc")]
fn shader_kind(stage: vk::ShaderStageFlags) -> Result<shaderc::ShaderKind> {
    Ok(match stage {
        vk::ShaderStageFlags::VERTEX => shaderc::ShaderKind::Vertex,
        vk::ShaderStageFlags::TESSELLATION_CONTROL => shaderc::ShaderKind::TessControl,
        vk::ShaderStageFlags::TESSELLATION_EVALUATION => shaderc::ShaderKind::TessEvaluation,
        vk::ShaderStageFlags::GEOMETRY => shaderc::ShaderKind::Geometry,
        vk::ShaderStageFlags::FRAGMENT => shaderc::ShaderKind::Fragment,
        vk::ShaderStageFlags::COMPUTE => shaderc::ShaderKind::Compute,
        other => anyhow::bail!("No GLSL compiler stage for {:?}", other),
    })
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_dir::TestDir;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn spirv_source_is_passed_through() {
        let words = vec![SPIRV_MAGIC, 0x0001_0000];
        let loaded = ShaderSource::Spirv(words.clone())
            .load(vk::ShaderStageFlags::VERTEX)
            .unwrap();
        assert_eq!(loaded, words);
    }

    #[test]
    fn spv_extension_is_detected() {
        assert!(is_spirv_file(Path::new("assets/shaders/a.vert.spv")));
        assert!(is_spirv_file(Path::new("B.SPV")));
        assert!(!is_spirv_file(Path::new("a.vert")));
    }

    #[test]
    fn spirv_bytes_are_decoded() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        assert_eq!(spirv_from_bytes(&bytes).unwrap(), vec![SPIRV_MAGIC, 7]);
    }

    #[test]
    fn misaligned_spirv_is_rejected() {
        assert!(spirv_from_bytes(&[0x03, 0x02, 0x23]).is_err());
    }

    #[test]
    fn spirv_file_is_read() {
        let dir = TestDir::new("shader");
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let path = dir.write("basic.frag.spv", &bytes);

        let words = ShaderSource::File(path)
            .load(vk::ShaderStageFlags::FRAGMENT)
            .unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 1]);
    }

    #[cfg(not(feature = "shaderc"))]
    #[test]
    fn glsl_needs_the_shaderc_feature() {
        let err = ShaderSource::glsl("inline", "#version 450\nvoid main() {}")
            .load(vk::ShaderStageFlags::VERTEX)
            .unwrap_err();
        assert!(err.to_string().contains("shaderc"));
    }
}
