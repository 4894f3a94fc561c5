// End-to-end checks of the GPU-free parts of the public API

use approx::assert_relative_eq;
use ash::vk;
use glam::{Mat4, Vec3, Vec4Swizzles};
use vk_launchpad::assets::{parse_model_geometry, DdsError, DdsImage};
use vk_launchpad::camera::{Camera, FlyCamera, InputState, OrbitCamera};
use vk_launchpad::config::{CameraKind, Config};
use vk_launchpad::math::create_perspective_projection_matrix;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

const QUAD_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

fn dds_bytes(width: u32, height: u32, levels: u32, fourcc: &[u8; 4]) -> Vec<u8> {
    let mut bytes = vec![0u8; 128];
    bytes[..4].copy_from_slice(b"DDS ");
    let mut put = |offset: usize, value: u32| {
        bytes[4 + offset..8 + offset].copy_from_slice(&value.to_le_bytes());
    };
    put(0, 124);
    put(8, height);
    put(12, width);
    put(24, levels);
    put(76, 0x4);
    put(80, u32::from_le_bytes(*fourcc));
    bytes
}

#[test]
fn quad_is_triangulated_and_flattened() {
    let quad = parse_model_geometry(QUAD_OBJ).unwrap();

    assert_eq!(quad.positions.len(), 6);
    assert_eq!(quad.indices, (0..6).collect::<Vec<u32>>());
    assert_eq!(quad.normals, vec![Vec3::Z; 6]);

    // v is flipped for Vulkan's top-left texture origin
    let first = quad.texture_coordinates[0];
    assert_relative_eq!(first.x, 0.0);
    assert_relative_eq!(first.y, 1.0);
}

#[test]
fn dds_mip_chain_is_addressable() {
    // 8x8 DXT5: 64 + 16 + 16 + 16 bytes for 4 levels
    let mut bytes = dds_bytes(8, 8, 4, b"DXT5");
    bytes.extend(std::iter::repeat(0xAB).take(64 + 16 + 16 + 16));
    let image = DdsImage::from_bytes(bytes).unwrap();

    assert_eq!(image.info().format, vk::Format::BC3_SRGB_BLOCK);
    assert_eq!(image.level_count(), 4);
    assert_eq!(image.level_info(3).unwrap().extent, vk::Extent2D { width: 1, height: 1 });
    assert_eq!(image.face_level_data(0, 0).unwrap().len(), 64);
    assert_eq!(image.face_level_data(0, 3).unwrap().len(), 16);
    assert_eq!(
        image.level_info(4).unwrap_err(),
        DdsError::LevelOutOfRange { level: 4, levels: 4 }
    );
}

#[test]
fn dds_file_is_read_from_disk() {
    let path = std::env::temp_dir().join(format!("vk-launchpad-public-api-{}.dds", std::process::id()));
    let mut bytes = dds_bytes(4, 4, 1, b"DXT1");
    bytes.extend([0u8; 8]);
    std::fs::write(&path, &bytes).unwrap();

    let image = DdsImage::open(&path);
    let _ = std::fs::remove_file(&path);

    let image = image.unwrap();
    assert_eq!(image.info().format, vk::Format::BC1_RGB_SRGB_BLOCK);
    assert_eq!(image.face_level_data(0, 0).unwrap().len(), 8);
}

#[test]
fn config_drives_the_projection() {
    let config = Config::from_toml_str(
        r#"
        [camera]
        kind = "fly"
        field_of_view_degrees = 90.0
        near_plane = 1.0
        far_plane = 10.0
        "#,
    )
    .unwrap();
    assert_eq!(config.camera.kind, CameraKind::Fly);

    let projection = create_perspective_projection_matrix(
        config.camera.field_of_view_degrees.to_radians(),
        1.0,
        config.camera.near_plane,
        config.camera.far_plane,
    );

    // Near plane maps to depth 0, far plane to depth 1
    let near = projection * glam::Vec4::new(0.0, 0.0, -1.0, 1.0);
    let far = projection * glam::Vec4::new(0.0, 0.0, -10.0, 1.0);
    assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
    assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-6);
}

#[test]
fn orbit_camera_follows_mouse_drag() {
    let mut camera = OrbitCamera::with_default_projection(800, 600);
    let mut input = InputState::new();

    input.set_cursor_position(100.0, 100.0);
    camera.update_from_input(&input, 0.016);

    input.set_mouse_button(MouseButton::Left, true);
    input.set_cursor_position(100.0 + std::f64::consts::PI / 0.005, 100.0);
    camera.update_from_input(&input, 0.016);

    // Half a turn puts the camera behind the orbit center
    let position = camera.position();
    assert_relative_eq!(position.z, -6.0, epsilon = 1e-3);

    let center = camera.view_matrix() * glam::Vec4::W;
    assert!(center.xyz().abs_diff_eq(Vec3::new(0.0, 0.0, -6.0), 1e-3));
}

#[test]
fn fly_camera_moves_forward_with_w() {
    let mut camera = FlyCamera::new(Mat4::IDENTITY);
    let mut input = InputState::new();
    input.set_key(KeyCode::KeyW, true);

    camera.update_from_input(&input, 0.5);
    assert!(camera.position().abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-5));

    input.set_key(KeyCode::ShiftLeft, true);
    camera.update_from_input(&input, 0.5);
    assert!(camera.position().abs_diff_eq(Vec3::new(1.5, 0.0, 0.0), 1e-5));
}
