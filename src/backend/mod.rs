// Backend module - Vulkan building blocks
//
// Thin wrappers around ash. `Launchpad` composes them; applications may
// also use them directly, e.g. to create depth images before the
// framework exists.

pub mod buffer;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use device::{required_instance_extensions, VulkanDevice};
pub use image::DeviceLocalImage;
pub use pipeline::GraphicsPipelineConfig;
pub use shader::ShaderSource;
pub use swapchain::{FramebufferComposition, Surface, Swapchain, SwapchainConfig, SwapchainImageDetails};
