// Render pass, framebuffer and graphics pipeline creation
//
// The render pass is derived from the attachments of one framebuffer
// composition. Graphics pipelines fill in fixed defaults around the few
// settings a `GraphicsPipelineConfig` exposes.

use super::shader::{create_shader_module, ShaderSource};
use super::swapchain::FramebufferComposition;
use super::VulkanDevice;
use crate::error::LaunchpadError;
use anyhow::{Context, Result};
use ash::vk;

pub fn is_depth_attachment(usage: vk::ImageUsageFlags) -> bool {
    usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
}

/// Stages and accesses of the dependency between whatever precedes the
/// render pass and its only subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalDependency {
    pub src_stages: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl ExternalDependency {
    /// Transfers before the pass must finish before fragment shaders read;
    /// with depth, depth writes of the previous frame must finish too.
    pub fn new(has_depth: bool) -> Self {
        let mut dependency = Self {
            src_stages: vk::PipelineStageFlags::TRANSFER,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_stages: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags::SHADER_READ,
        };

        if has_depth {
            let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            dependency.src_stages |= depth_stages;
            dependency.src_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
            dependency.dst_stages |= depth_stages;
            dependency.dst_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }

        dependency
    }
}

/// Create a single-subpass render pass for the given attachments
pub fn create_render_pass(
    device: &ash::Device,
    composition: &FramebufferComposition,
) -> Result<vk::RenderPass> {
    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();
    let mut depth_refs = Vec::new();

    for details in composition.attachments() {
        let index = attachments.len() as u32;
        let depth = is_depth_attachment(details.usage);

        attachments.push(
            vk::AttachmentDescription::default()
                .format(details.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                // Depth is not needed after the pass
                .store_op(if depth {
                    vk::AttachmentStoreOp::DONT_CARE
                } else {
                    vk::AttachmentStoreOp::STORE
                })
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(if depth {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::PRESENT_SRC_KHR
                }),
        );

        if depth {
            depth_refs.push(
                vk::AttachmentReference::default()
                    .attachment(index)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        } else {
            color_refs.push(
                vk::AttachmentReference::default()
                    .attachment(index)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
        }
    }

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_refs.first() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }

    let external = ExternalDependency::new(!depth_refs.is_empty());
    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(external.src_stages)
            .dst_stage_mask(external.dst_stages)
            .src_access_mask(external.src_access)
            .dst_access_mask(external.dst_access),
        // The render-finished semaphore waits on everything, nothing else
        // has to wait on the color output
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::empty()),
    ];

    let subpasses = [subpass];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe {
        device
            .create_render_pass(&render_pass_info, None)
            .context("Failed to create render pass")
    }
}

/// Create one framebuffer per set of attachment views
pub fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    attachment_views: &[Vec<vk::ImageView>],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(attachment_views.len());

    for views in attachment_views {
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) };
        match framebuffer {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                for framebuffer in framebuffers {
                    unsafe { device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(e).context("Failed to create framebuffer");
            }
        }
    }

    Ok(framebuffers)
}

/// Settings for `Launchpad::create_graphics_pipeline()`
#[derive(Debug, Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: ShaderSource,
    pub fragment_shader: ShaderSource,
    /// One description per bound vertex buffer
    pub vertex_input_buffers: Vec<vk::VertexInputBindingDescription>,
    /// One description per vertex shader input location
    pub input_attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    pub polygon_draw_mode: vk::PolygonMode,
    pub triangle_culling_mode: vk::CullModeFlags,
    /// Bindings of descriptor set 0
    pub descriptor_layout: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    /// SRC_ALPHA / ONE_MINUS_SRC_ALPHA color blending
    pub enable_alpha_blending: bool,
}

impl GraphicsPipelineConfig {
    /// Filled triangles, no culling, no vertex input, no descriptors
    pub fn new(vertex_shader: ShaderSource, fragment_shader: ShaderSource) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            vertex_input_buffers: Vec::new(),
            input_attribute_descriptions: Vec::new(),
            polygon_draw_mode: vk::PolygonMode::FILL,
            triangle_culling_mode: vk::CullModeFlags::NONE,
            descriptor_layout: Vec::new(),
            enable_alpha_blending: false,
        }
    }
}

/// What a pipeline renders into
#[derive(Debug, Clone, Copy)]
pub struct PipelineTarget {
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub has_depth: bool,
}

/// Layout objects owned by a pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineLayouts {
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
}

impl PipelineLayouts {
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
    }
}

pub fn color_blend_attachment(enable_alpha_blending: bool) -> vk::PipelineColorBlendAttachmentState {
    let state = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(enable_alpha_blending);

    if !enable_alpha_blending {
        return state;
    }

    state
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Line and point fill need `fillModeNonSolid`
pub fn check_polygon_mode(
    mode: vk::PolygonMode,
    features: &vk::PhysicalDeviceFeatures,
) -> Result<(), LaunchpadError> {
    if mode != vk::PolygonMode::FILL && features.fill_mode_non_solid == vk::FALSE {
        return Err(LaunchpadError::MissingFeature("fillModeNonSolid"));
    }
    Ok(())
}

/// Create a graphics pipeline and the layouts it uses
pub fn create_graphics_pipeline(
    device: &VulkanDevice,
    target: &PipelineTarget,
    config: &GraphicsPipelineConfig,
) -> Result<(vk::Pipeline, PipelineLayouts)> {
    check_polygon_mode(config.polygon_draw_mode, &device.enabled_features)?;

    let vertex_code = config
        .vertex_shader
        .load(vk::ShaderStageFlags::VERTEX)
        .context("Failed to load vertex shader")?;
    let fragment_code = config
        .fragment_shader
        .load(vk::ShaderStageFlags::FRAGMENT)
        .context("Failed to load fragment shader")?;

    let vertex_module = create_shader_module(device, &vertex_code)?;
    let fragment_module = match create_shader_module(device, &fragment_code) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.device.destroy_shader_module(vertex_module, None) };
            return Err(e);
        }
    };

    let result = build_pipeline(device, target, config, vertex_module, fragment_module);

    // Modules are not needed once the pipeline exists
    unsafe {
        device.device.destroy_shader_module(fragment_module, None);
        device.device.destroy_shader_module(vertex_module, None);
    }

    result
}

fn build_pipeline(
    device: &VulkanDevice,
    target: &PipelineTarget,
    config: &GraphicsPipelineConfig,
    vertex_module: vk::ShaderModule,
    fragment_module: vk::ShaderModule,
) -> Result<(vk::Pipeline, PipelineLayouts)> {
    let entry_point = c"main";

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(entry_point),
    ];

    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&config.vertex_input_buffers)
        .vertex_attribute_descriptions(&config.input_attribute_descriptions);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor cover the whole swapchain image
    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: target.extent.width as f32,
        height: target.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: target.extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(config.polygon_draw_mode)
        .line_width(1.0)
        .cull_mode(config.triangle_culling_mode)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(target.has_depth)
        .depth_write_enable(target.has_depth)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachments = [color_blend_attachment(config.enable_alpha_blending)];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    // One descriptor set, possibly without bindings
    let set_layout_info =
        vk::DescriptorSetLayoutCreateInfo::default().bindings(&config.descriptor_layout);
    let descriptor_set_layout = unsafe {
        device
            .device
            .create_descriptor_set_layout(&set_layout_info, None)
            .context("Failed to create descriptor set layout")?
    };

    let set_layouts = [descriptor_set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let pipeline_layout = match unsafe { device.device.create_pipeline_layout(&layout_info, None) } {
        Ok(layout) => layout,
        Err(e) => {
            unsafe {
                device
                    .device
                    .destroy_descriptor_set_layout(descriptor_set_layout, None)
            };
            return Err(e).context("Failed to create pipeline layout");
        }
    };
    let layouts = PipelineLayouts {
        descriptor_set_layout,
        pipeline_layout,
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .layout(pipeline_layout)
        .render_pass(target.render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    match pipelines {
        Ok(pipelines) => Ok((pipelines[0], layouts)),
        Err((_, e)) => {
            layouts.destroy(&device.device);
            Err(e).context("Failed to create graphics pipeline")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wireframe_needs_non_solid_fill() {
        let without = vk::PhysicalDeviceFeatures::default();
        let with = vk::PhysicalDeviceFeatures {
            fill_mode_non_solid: vk::TRUE,
            ..Default::default()
        };

        assert!(check_polygon_mode(vk::PolygonMode::FILL, &without).is_ok());
        assert!(matches!(
            check_polygon_mode(vk::PolygonMode::LINE, &without),
            Err(LaunchpadError::MissingFeature("fillModeNonSolid"))
        ));
        assert!(check_polygon_mode(vk::PolygonMode::LINE, &with).is_ok());
    }

    #[test]
    fn color_only_dependency_waits_for_transfers() {
        let dependency = ExternalDependency::new(false);
        assert_eq!(dependency.src_stages, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dependency.dst_stages, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(dependency.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn depth_adds_fragment_test_stages() {
        let dependency = ExternalDependency::new(true);
        for stages in [dependency.src_stages, dependency.dst_stages] {
            assert!(stages.contains(
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
            ));
        }
        assert!(dependency
            .dst_access
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn depth_usage_is_recognized() {
        assert!(is_depth_attachment(
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
        ));
        assert!(!is_depth_attachment(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn blending_is_opt_in() {
        let opaque = color_blend_attachment(false);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);

        let blended = color_blend_attachment(true);
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            blended.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn config_defaults() {
        let config = GraphicsPipelineConfig::new(
            ShaderSource::file("a.vert"),
            ShaderSource::file("a.frag"),
        );
        assert_eq!(config.polygon_draw_mode, vk::PolygonMode::FILL);
        assert_eq!(config.triangle_culling_mode, vk::CullModeFlags::NONE);
        assert!(!config.enable_alpha_blending);
    }
}
