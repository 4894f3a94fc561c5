// Framework misuse errors
//
// Vulkan and I/O failures travel as anyhow errors with context. The
// variants here describe calls the framework refuses to carry out.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchpadError {
    #[error("invalid framework configuration: {0}")]
    InvalidInit(String),

    #[error("no command buffer is recording, call start_recording_commands() first")]
    NotRecording,

    #[error("pipeline {0:?} was not created with create_graphics_pipeline()")]
    UnknownPipeline(vk::Pipeline),

    #[error("buffer {0:?} is not tracked by the framework")]
    UnknownBuffer(vk::Buffer),

    #[error("framebuffer index {index} out of range, there are {count} framebuffers")]
    FramebufferIndexOutOfRange { index: u32, count: u32 },

    #[error("copy of {len} bytes at offset {offset} exceeds buffer size {size}")]
    CopyOutOfBounds { offset: usize, len: usize, size: u64 },

    #[error("no memory type matches filter {type_filter:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("no swapchain image acquired for this frame, call wait_for_next_swapchain_image() first")]
    NoImageAcquired,

    #[error("device feature {0} is not enabled")]
    MissingFeature(&'static str),

    #[error("swapchain is out of date")]
    SwapchainOutOfDate,
}
