// Launchpad - the framework context
//
// Owns everything needed to render into the images of an existing
// swapchain: render pass, framebuffers, frame synchronization, single-use
// command buffers and the buffers, images and pipelines created through
// it. One frame is in flight at a time:
//
//   wait_for_next_swapchain_image()
//   start_recording_commands()
//   ... record draw commands ...
//   end_recording_commands()
//   present_current_swapchain_image()

use crate::assets::{DdsImage, ImageInfo};
use crate::backend::buffer::{self, Buffer};
use crate::backend::image::check_image_format;
use crate::backend::pipeline::{
    self, is_depth_attachment, ExternalDependency, GraphicsPipelineConfig, PipelineLayouts,
    PipelineTarget,
};
use crate::backend::swapchain::{Surface, SwapchainConfig, SwapchainImageDetails};
use crate::backend::sync::{command_buffers_to_retire, FrameSync, FrameTracker, CONCURRENT_FRAMES};
use crate::backend::{DeviceLocalImage, ShaderSource, VulkanDevice};
use crate::error::LaunchpadError;
use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_void, CStr};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Swapchain images smaller than this in either dimension are rejected
pub const MIN_IMAGE_EXTENT: u32 = 128;

/// Check a swapchain description before building anything from it
pub fn validate_swapchain_config(config: &SwapchainConfig) -> Result<(), LaunchpadError> {
    let invalid = |msg: String| Err(LaunchpadError::InvalidInit(msg));

    if config.swapchain == vk::SwapchainKHR::null() {
        return invalid("swapchain handle is null".to_string());
    }

    let extent = config.image_extent;
    if extent.width == 0 || extent.height == 0 {
        return invalid(format!(
            "swapchain extent {}x{} has a zero dimension",
            extent.width, extent.height
        ));
    }
    if extent.width < MIN_IMAGE_EXTENT || extent.height < MIN_IMAGE_EXTENT {
        return invalid(format!(
            "swapchain extent {}x{} is below the minimum of {}x{}",
            extent.width, extent.height, MIN_IMAGE_EXTENT, MIN_IMAGE_EXTENT
        ));
    }

    let Some(first) = config.images.first() else {
        return invalid("swapchain config has no images".to_string());
    };

    for (i, composition) in config.images.iter().enumerate() {
        check_attachment(i, "color", &composition.color)?;
        if let Some(depth) = &composition.depth {
            check_attachment(i, "depth", depth)?;
        }

        if composition.depth.is_some() != first.depth.is_some() {
            return invalid(format!(
                "image {} {} a depth attachment, image 0 {}",
                i,
                if composition.depth.is_some() { "has" } else { "lacks" },
                if first.depth.is_some() { "has one" } else { "does not" }
            ));
        }

        for (attachment, reference) in composition.attachments().zip(first.attachments()) {
            if attachment.format != reference.format || attachment.usage != reference.usage {
                return invalid(format!(
                    "image {} attachment ({:?}, {:?}) differs from image 0 ({:?}, {:?})",
                    i, attachment.format, attachment.usage, reference.format, reference.usage
                ));
            }
        }
    }

    Ok(())
}

fn check_attachment(
    index: usize,
    kind: &str,
    details: &SwapchainImageDetails,
) -> Result<(), LaunchpadError> {
    if details.image == vk::Image::null() {
        return Err(LaunchpadError::InvalidInit(format!(
            "{} image of swapchain image {} is null",
            kind, index
        )));
    }
    if details.format == vk::Format::UNDEFINED {
        return Err(LaunchpadError::InvalidInit(format!(
            "{} image of swapchain image {} has an undefined format",
            kind, index
        )));
    }
    if details.usage.is_empty() {
        return Err(LaunchpadError::InvalidInit(format!(
            "{} image of swapchain image {} has no usage flags",
            kind, index
        )));
    }
    Ok(())
}

/// Host-coherent vertex buffer layout of the basic pipeline: one vec3 position
fn basic_pipeline_config(vertex_shader: ShaderSource, fragment_shader: ShaderSource) -> GraphicsPipelineConfig {
    let mut config = GraphicsPipelineConfig::new(vertex_shader, fragment_shader);
    config.vertex_input_buffers = vec![vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<[f32; 3]>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    config.input_attribute_descriptions = vec![vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: 0,
    }];
    config
}

#[cfg(prebuilt_basic_shaders)]
fn basic_shaders() -> Result<Option<(ShaderSource, ShaderSource)>> {
    use crate::backend::shader::spirv_from_bytes;

    let vertex = spirv_from_bytes(include_bytes!(concat!(env!("OUT_DIR"), "/basic.vert.spv")))?;
    let fragment = spirv_from_bytes(include_bytes!(concat!(env!("OUT_DIR"), "/basic.frag.spv")))?;
    Ok(Some((ShaderSource::Spirv(vertex), ShaderSource::Spirv(fragment))))
}

#[cfg(all(not(prebuilt_basic_shaders), feature = "shaderc"))]
fn basic_shaders() -> Result<Option<(ShaderSource, ShaderSource)>> {
    Ok(Some((
        ShaderSource::glsl("basic.vert", include_str!("../shaders/basic.vert")),
        ShaderSource::glsl("basic.frag", include_str!("../shaders/basic.frag")),
    )))
}

#[cfg(all(not(prebuilt_basic_shaders), not(feature = "shaderc")))]
fn basic_shaders() -> Result<Option<(ShaderSource, ShaderSource)>> {
    Ok(None)
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Vulkan] {}", message),
        _ => log::debug!("[Vulkan] {}", message),
    }

    vk::FALSE
}

fn create_debug_messenger(
    device: &VulkanDevice,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(&device.entry, &device.instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION)
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe {
        debug_utils
            .create_debug_utils_messenger(&create_info, None)
            .context("Failed to create debug messenger")?
    };

    Ok((debug_utils, messenger))
}

fn create_attachment_view(device: &ash::Device, details: &SwapchainImageDetails) -> Result<vk::ImageView> {
    let aspect_mask = if is_depth_attachment(details.usage) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    let create_info = vk::ImageViewCreateInfo::default()
        .image(details.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(details.format)
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .create_image_view(&create_info, None)
            .context("Failed to create attachment view")
    }
}

pub struct Launchpad {
    device: Arc<VulkanDevice>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    extent: vk::Extent2D,
    has_depth: bool,

    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    // Per swapchain image
    attachment_views: Vec<Vec<vk::ImageView>>,
    clear_values: Vec<Vec<vk::ClearValue>>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,

    // Per frame in flight
    frame_sync: Vec<FrameSync>,
    tracker: FrameTracker,

    command_pool: vk::CommandPool,
    command_buffers: VecDeque<vk::CommandBuffer>,
    recording: Option<vk::CommandBuffer>,

    basic_pipeline: Option<(vk::Pipeline, PipelineLayouts)>,
    pipelines: HashMap<vk::Pipeline, PipelineLayouts>,
    host_coherent_buffers: HashMap<vk::Buffer, Buffer>,
    device_local_buffers: HashMap<vk::Buffer, Buffer>,
    images: HashMap<vk::Image, DeviceLocalImage>,
}

impl Launchpad {
    /// Set up rendering into the images described by `config`.
    ///
    /// The swapchain and its images stay owned by the caller and must
    /// outlive the framework.
    pub fn new(device: Arc<VulkanDevice>, surface: &Surface, config: SwapchainConfig) -> Result<Self> {
        validate_swapchain_config(&config)?;

        let capabilities = surface.capabilities()?;
        let surface_extent = capabilities.current_extent;
        if surface_extent.width != u32::MAX && surface_extent != config.image_extent {
            log::warn!(
                "Swapchain extent {}x{} differs from the surface extent {}x{}",
                config.image_extent.width,
                config.image_extent.height,
                surface_extent.width,
                surface_extent.height
            );
        }

        let image_count = config.images.len();
        let has_depth = config.images[0].depth.is_some();
        log::info!(
            "Initializing framework: {} images, {}x{}, depth: {}",
            image_count,
            config.image_extent.width,
            config.image_extent.height,
            has_depth
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(&device.instance, &device.device);

        // Filled in step by step, Drop releases whatever exists on error
        let mut this = Self {
            device: device.clone(),
            swapchain_loader,
            swapchain: config.swapchain,
            extent: config.image_extent,
            has_depth,
            debug_utils: None,
            attachment_views: Vec::with_capacity(image_count),
            clear_values: Vec::with_capacity(image_count),
            framebuffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            frame_sync: Vec::with_capacity(CONCURRENT_FRAMES),
            tracker: FrameTracker::new(image_count, CONCURRENT_FRAMES),
            command_pool: vk::CommandPool::null(),
            command_buffers: VecDeque::new(),
            recording: None,
            basic_pipeline: None,
            pipelines: HashMap::new(),
            host_coherent_buffers: HashMap::new(),
            device_local_buffers: HashMap::new(),
            images: HashMap::new(),
        };

        if device.validation_enabled {
            this.debug_utils = Some(create_debug_messenger(&device)?);
        }

        for composition in &config.images {
            let mut views = Vec::with_capacity(2);
            for details in composition.attachments() {
                match create_attachment_view(&device.device, details) {
                    Ok(view) => views.push(view),
                    Err(e) => {
                        this.attachment_views.push(views);
                        return Err(e);
                    }
                }
            }
            this.attachment_views.push(views);
            this.clear_values
                .push(composition.attachments().map(|details| details.clear_value).collect());
        }

        this.render_pass = pipeline::create_render_pass(&device.device, &config.images[0])?;
        this.framebuffers = pipeline::create_framebuffers(
            &device.device,
            this.render_pass,
            &this.attachment_views,
            this.extent,
        )?;

        for _ in 0..CONCURRENT_FRAMES {
            this.frame_sync.push(FrameSync::new(&device)?);
        }

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(device.graphics_queue_family);
        this.command_pool = unsafe {
            device
                .device
                .create_command_pool(&pool_info, None)
                .context("Failed to create command pool")?
        };

        match basic_shaders()? {
            Some((vertex, fragment)) => {
                let config = basic_pipeline_config(vertex, fragment);
                this.basic_pipeline = Some(pipeline::create_graphics_pipeline(
                    &device,
                    &this.pipeline_target(),
                    &config,
                )?);
            }
            None => log::warn!(
                "Basic pipeline unavailable: glslc was not found at build time and the `shaderc` feature is disabled"
            ),
        }

        log::info!("Framework initialized");
        Ok(this)
    }

    fn pipeline_target(&self) -> PipelineTarget {
        PipelineTarget {
            render_pass: self.render_pass,
            extent: self.extent,
            has_depth: self.has_depth,
        }
    }

    fn current_sync(&self) -> &FrameSync {
        &self.frame_sync[self.tracker.current_slot()]
    }

    fn current_image(&self) -> Result<u32, LaunchpadError> {
        self.tracker.acquired_image().ok_or(LaunchpadError::NoImageAcquired)
    }

    /// Give up on a frame that acquired an image but never presented it.
    /// Its fence was reset, so signal it with an empty submission.
    fn abandon_frame(&mut self, image: u32) -> Result<()> {
        log::warn!("Frame with swapchain image {} was never presented", image);
        self.recording = None;

        let fence = self.current_sync().in_flight_fence;
        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[], fence)
                .context("Failed to signal fence of abandoned frame")?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------- frames

    /// Wait until the next frame can be recorded and acquire its swapchain
    /// image. Returns the seconds spent waiting.
    pub fn wait_for_next_swapchain_image(&mut self) -> Result<f64> {
        let start = Instant::now();
        if let Some(image) = self.tracker.finish_frame() {
            self.abandon_frame(image)?;
        }

        let device = &self.device.device;
        let slot = self.tracker.begin_frame();
        let sync = &self.frame_sync[slot];

        unsafe {
            device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
                .context("Failed to wait for frame fence")?;
        }
        self.tracker.release_slot(slot);

        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };
        let image = match acquired {
            Ok((image, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swapchain is suboptimal for the surface");
                }
                image
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Err(LaunchpadError::SwapchainOutOfDate.into()),
            Err(e) => return Err(e).context("Failed to acquire swapchain image"),
        };

        // A previous frame may still be rendering into this image
        if let Some(guard) = self.tracker.slot_guarding(image) {
            unsafe {
                device
                    .wait_for_fences(&[self.frame_sync[guard].in_flight_fence], true, u64::MAX)
                    .context("Failed to wait for image fence")?;
            }
        }

        // Only reset once the frame is certain to reach present or abandon_frame()
        unsafe {
            device
                .reset_fences(&[sync.in_flight_fence])
                .context("Failed to reset frame fence")?;
        }
        self.tracker.image_acquired(image);

        let wait_semaphores = [sync.image_available];
        let wait_stages = [ExternalDependency::new(self.has_depth).dst_stages];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        unsafe {
            device
                .queue_submit(self.device.graphics_queue, &[submit_info], vk::Fence::null())
                .context("Failed to submit image-available wait")?;
        }

        Ok(start.elapsed().as_secs_f64())
    }

    /// Begin a single-use command buffer with the render pass started on the
    /// current framebuffer
    pub fn start_recording_commands(&mut self) -> Result<vk::CommandBuffer> {
        let image = self.current_image()?;
        if self.recording.is_some() {
            anyhow::bail!("Already recording, call end_recording_commands() first");
        }

        let device = &self.device.device;

        let retire = command_buffers_to_retire(
            self.command_buffers.len(),
            self.framebuffers.len(),
            CONCURRENT_FRAMES,
        );
        if retire > 0 {
            let retired: Vec<_> = self.command_buffers.drain(..retire).collect();
            unsafe { device.free_command_buffers(self.command_pool, &retired) };
        }

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .context("Failed to allocate command buffer")?[0]
        };
        self.command_buffers.push_back(command_buffer);

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let clear_values = &self.clear_values[image as usize];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(clear_values);

        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .context("Failed to begin command buffer")?;
            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
        }

        self.recording = Some(command_buffer);
        Ok(command_buffer)
    }

    /// End the render pass and submit the recorded commands
    pub fn end_recording_commands(&mut self) -> Result<()> {
        let command_buffer = self.recording.take().ok_or(LaunchpadError::NotRecording)?;
        let device = &self.device.device;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            device.cmd_end_render_pass(command_buffer);
            device
                .end_command_buffer(command_buffer)
                .context("Failed to end command buffer")?;
            device
                .queue_submit(self.device.graphics_queue, &[submit_info], vk::Fence::null())
                .context("Failed to submit command buffer")?;
        }

        Ok(())
    }

    /// Signal the frame's fence and present the current image. Each acquired
    /// image is presented at most once.
    pub fn present_current_swapchain_image(&mut self) -> Result<()> {
        let image = self.tracker.finish_frame().ok_or(LaunchpadError::NoImageAcquired)?;
        if self.recording.is_some() {
            log::warn!("Presenting while commands are still being recorded");
        }

        let slot = self.tracker.current_slot();
        let sync = self.current_sync();

        let signal_semaphores = [sync.render_finished];
        let submit_info = vk::SubmitInfo::default().signal_semaphores(&signal_semaphores);
        let submitted = unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], sync.in_flight_fence)
        };
        if let Err(e) = submitted {
            // Fence still reset, the next wait abandons the frame
            self.tracker.image_acquired(image);
            return Err(e).context("Failed to submit render-finished signal");
        }

        let swapchains = [self.swapchain];
        let image_indices = [image];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.swapchain_loader
                .queue_present(self.device.graphics_queue, &present_info)
        };

        // The fence is signaled either way
        self.tracker.mark_image_in_flight(image, slot);

        match presented {
            Ok(false) => Ok(()),
            Ok(true) => {
                log::warn!("Swapchain is suboptimal for the surface");
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(LaunchpadError::SwapchainOutOfDate.into()),
            Err(e) => Err(e).context("Failed to present"),
        }
    }

    // ------------------------------------------------------------- accessors

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Running frame counter, `None` before the first frame
    pub fn frame_id(&self) -> Option<u64> {
        self.tracker.frame_id()
    }

    /// Index of the image acquired by the last `wait_for_next_swapchain_image()`
    pub fn current_swapchain_image_index(&self) -> Option<u32> {
        self.tracker.last_acquired_image()
    }

    pub fn num_framebuffers(&self) -> u32 {
        self.framebuffers.len() as u32
    }

    /// Clear values per framebuffer, i.e. its attachment count
    pub fn num_clear_values(&self) -> u32 {
        self.clear_values.first().map_or(0, |values| values.len() as u32)
    }

    pub fn framebuffer(&self, index: u32) -> Result<vk::Framebuffer, LaunchpadError> {
        self.framebuffers
            .get(index as usize)
            .copied()
            .ok_or(LaunchpadError::FramebufferIndexOutOfRange {
                index,
                count: self.num_framebuffers(),
            })
    }

    pub fn current_framebuffer(&self) -> Result<vk::Framebuffer> {
        Ok(self.framebuffer(self.current_image()?)?)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn current_command_buffer(&self) -> Result<vk::CommandBuffer, LaunchpadError> {
        self.recording.ok_or(LaunchpadError::NotRecording)
    }

    /// Position-only pipeline drawing everything red, if shaders for it
    /// were available
    pub fn basic_pipeline(&self) -> Option<vk::Pipeline> {
        self.basic_pipeline.as_ref().map(|(pipeline, _)| *pipeline)
    }

    // ------------------------------------------------------------- pipelines

    pub fn create_graphics_pipeline(&mut self, config: &GraphicsPipelineConfig) -> Result<vk::Pipeline> {
        let (pipeline, layouts) =
            pipeline::create_graphics_pipeline(&self.device, &self.pipeline_target(), config)?;
        self.pipelines.insert(pipeline, layouts);
        Ok(pipeline)
    }

    /// Destroy a pipeline and its layouts. The caller makes sure it is no
    /// longer in use.
    pub fn destroy_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        let device = &self.device.device;
        match self.pipelines.remove(&pipeline) {
            Some(layouts) => layouts.destroy(device),
            None => log::warn!(
                "Pipeline {:?} was not created by the framework, its layouts are not destroyed",
                pipeline
            ),
        }
        unsafe { device.destroy_pipeline(pipeline, None) };
    }

    pub fn layout_for_pipeline(&self, pipeline: vk::Pipeline) -> Result<vk::PipelineLayout, LaunchpadError> {
        if let Some((basic, layouts)) = &self.basic_pipeline {
            if *basic == pipeline {
                return Ok(layouts.pipeline_layout);
            }
        }
        self.pipelines
            .get(&pipeline)
            .map(|layouts| layouts.pipeline_layout)
            .ok_or(LaunchpadError::UnknownPipeline(pipeline))
    }

    /// Bind `descriptor_set` as set 0 of `pipeline` in the current command
    /// buffer
    pub fn bind_descriptor_set_to_pipeline(
        &self,
        descriptor_set: vk::DescriptorSet,
        pipeline: vk::Pipeline,
    ) -> Result<(), LaunchpadError> {
        let command_buffer = self.current_command_buffer()?;
        let layout = self.layout_for_pipeline(pipeline)?;

        unsafe {
            self.device.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
        Ok(())
    }

    // ---------------------------------------------------------------- memory

    /// Raw memory allocation, freed by the caller with `vkFreeMemory`
    pub fn allocate_memory_for_requirements(
        &self,
        size: vk::DeviceSize,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        buffer::allocate_memory_for_requirements(&self.device, size, requirements, properties)
    }

    pub fn create_host_coherent_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer> {
        let buffer = Buffer::new(&self.device, "host-coherent buffer", size, usage, MemoryLocation::CpuToGpu)?;
        let handle = buffer.buffer;
        self.host_coherent_buffers.insert(handle, buffer);
        Ok(handle)
    }

    pub fn create_device_local_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer> {
        let buffer = Buffer::new(&self.device, "device-local buffer", size, usage, MemoryLocation::GpuOnly)?;
        let handle = buffer.buffer;
        self.device_local_buffers.insert(handle, buffer);
        Ok(handle)
    }

    pub fn destroy_host_coherent_buffer(&mut self, buffer: vk::Buffer) {
        match self.host_coherent_buffers.remove(&buffer) {
            Some(tracked) => tracked.destroy(&self.device),
            None => self.destroy_untracked_buffer(buffer),
        }
    }

    pub fn destroy_device_local_buffer(&mut self, buffer: vk::Buffer) {
        match self.device_local_buffers.remove(&buffer) {
            Some(tracked) => tracked.destroy(&self.device),
            None => self.destroy_untracked_buffer(buffer),
        }
    }

    fn destroy_untracked_buffer(&self, buffer: vk::Buffer) {
        log::warn!(
            "Buffer {:?} is not tracked by the framework, destroying it without freeing its memory",
            buffer
        );
        unsafe { self.device.device.destroy_buffer(buffer, None) };
    }

    pub fn copy_data_into_host_coherent_buffer<T: Pod>(&mut self, buffer: vk::Buffer, data: &[T]) -> Result<()> {
        self.copy_data_into_host_coherent_buffer_with_offset(buffer, 0, data)
    }

    pub fn copy_data_into_host_coherent_buffer_with_offset<T: Pod>(
        &mut self,
        buffer: vk::Buffer,
        offset: usize,
        data: &[T],
    ) -> Result<()> {
        let tracked = self
            .host_coherent_buffers
            .get_mut(&buffer)
            .ok_or(LaunchpadError::UnknownBuffer(buffer))?;
        tracked.write_bytes(offset, bytemuck::cast_slice(data))
    }

    /// Create a host-coherent buffer sized for `data` and fill it. `usage`
    /// is extended with TRANSFER_DST.
    pub fn create_host_coherent_buffer_and_upload<T: Pod>(
        &mut self,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = self.create_host_coherent_buffer(
            bytes.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
        )?;
        if let Err(e) = self.copy_data_into_host_coherent_buffer(buffer, bytes) {
            self.destroy_host_coherent_buffer(buffer);
            return Err(e);
        }
        Ok(buffer)
    }

    /// Single-layer 2D image with a full mip chain
    pub fn create_device_local_image(
        &mut self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<vk::Image> {
        self.create_device_local_image_with_layers(
            width,
            height,
            format,
            usage,
            1,
            vk::ImageCreateFlags::empty(),
        )
    }

    pub fn create_device_local_image_with_layers(
        &mut self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        array_layers: u32,
        flags: vk::ImageCreateFlags,
    ) -> Result<vk::Image> {
        let image =
            DeviceLocalImage::with_layers(&self.device, width, height, format, usage, array_layers, flags)?;
        let handle = image.image;
        self.images.insert(handle, image);
        Ok(handle)
    }

    pub fn destroy_device_local_image(&mut self, image: vk::Image) {
        match self.images.remove(&image) {
            Some(tracked) => tracked.destroy(&self.device),
            None => {
                log::warn!(
                    "Image {:?} is not tracked by the framework, destroying it without freeing its memory",
                    image
                );
                unsafe { self.device.device.destroy_image(image, None) };
            }
        }
    }

    // ------------------------------------------------------------------- DDS

    pub fn dds_image_info(&self, path: impl AsRef<Path>) -> Result<ImageInfo> {
        Ok(DdsImage::open(path)?.info())
    }

    pub fn dds_image_level_info(&self, path: impl AsRef<Path>, level: u32) -> Result<ImageInfo> {
        Ok(DdsImage::open(path)?.level_info(level)?)
    }

    /// Upload the top level of a DDS file into a new host-coherent buffer,
    /// ready to be copied into an image
    pub fn load_dds_image_into_host_coherent_buffer(&mut self, path: impl AsRef<Path>) -> Result<vk::Buffer> {
        self.load_dds_image_face_level_into_host_coherent_buffer(path, 0, 0)
    }

    pub fn load_dds_image_level_into_host_coherent_buffer(
        &mut self,
        path: impl AsRef<Path>,
        level: u32,
    ) -> Result<vk::Buffer> {
        self.load_dds_image_face_level_into_host_coherent_buffer(path, 0, level)
    }

    pub fn load_dds_image_face_level_into_host_coherent_buffer(
        &mut self,
        path: impl AsRef<Path>,
        face: u32,
        level: u32,
    ) -> Result<vk::Buffer> {
        let path = path.as_ref();
        let dds = DdsImage::open(path)?;
        check_image_format(dds.info().format, &self.device.enabled_features)
            .with_context(|| format!("DDS texture {:?} cannot be used on this GPU", path))?;
        let data = dds
            .face_level_data(face, level)
            .with_context(|| format!("Failed to read face {} level {} of {:?}", face, level, path))?;

        self.create_host_coherent_buffer_and_upload(
            data,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
        )
    }
}

impl Drop for Launchpad {
    fn drop(&mut self) {
        log::info!("Destroying framework...");

        let _ = self.device.wait_idle();
        let device = self.device.clone();
        let vk_device = &device.device;

        unsafe {
            let command_buffers: Vec<_> = self.command_buffers.drain(..).collect();
            if !command_buffers.is_empty() {
                vk_device.free_command_buffers(self.command_pool, &command_buffers);
            }

            for (pipeline, layouts) in self.pipelines.drain() {
                log::warn!("Pipeline {:?} was never destroyed", pipeline);
                vk_device.destroy_pipeline(pipeline, None);
                layouts.destroy(vk_device);
            }

            vk_device.destroy_command_pool(self.command_pool, None);

            if let Some((pipeline, layouts)) = self.basic_pipeline.take() {
                vk_device.destroy_pipeline(pipeline, None);
                layouts.destroy(vk_device);
            }

            for sync in &self.frame_sync {
                sync.destroy(vk_device);
            }

            for &framebuffer in &self.framebuffers {
                vk_device.destroy_framebuffer(framebuffer, None);
            }
            vk_device.destroy_render_pass(self.render_pass, None);

            for &view in self.attachment_views.iter().flatten() {
                vk_device.destroy_image_view(view, None);
            }

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
        }

        for (handle, buffer) in self
            .host_coherent_buffers
            .drain()
            .chain(self.device_local_buffers.drain())
        {
            log::warn!("Buffer {:?} was never destroyed", handle);
            buffer.destroy(&device);
        }
        for (handle, image) in self.images.drain() {
            log::warn!("Image {:?} was never destroyed", handle);
            image.destroy(&device);
        }
    }
}
