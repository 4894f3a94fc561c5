// Build script to compile the framework's basic GLSL shaders to SPIR-V
//
// The SPIR-V lands in OUT_DIR. When both shaders compile, the
// `prebuilt_basic_shaders` cfg is set and the library embeds them.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/");
    println!("cargo:rustc-check-cfg=cfg(prebuilt_basic_shaders)");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    // Compile shaders using glslc (part of Vulkan SDK)
    let vert = compile_shader("shaders/basic.vert", &out_dir.join("basic.vert.spv"));
    let frag = compile_shader("shaders/basic.frag", &out_dir.join("basic.frag.spv"));

    if vert && frag {
        println!("cargo:rustc-cfg=prebuilt_basic_shaders");
    }
}

fn compile_shader(input: &str, output: &Path) -> bool {
    let input_path = Path::new(input);

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output)
        .status();

    match result {
        Ok(status) if status.success() => true,
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} not precompiled", e, input);
            false
        }
    }
}
