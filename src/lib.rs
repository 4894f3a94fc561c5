// vk-launchpad - a small Vulkan framework for learning graphics programming
//
// `Launchpad` renders into the images of an application-owned swapchain
// with one frame in flight. Around it sit the Vulkan building blocks in
// `backend`, asset loaders (OBJ models, DDS textures), a perspective
// projection helper and orbit/fly cameras driven by winit input.

pub mod assets;
pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod launchpad;
pub mod math;

pub use config::Config;
pub use error::LaunchpadError;
pub use launchpad::Launchpad;
