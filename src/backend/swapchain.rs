// Swapchain - Window presentation
//
// Owns the surface, the swapchain and, when requested, one depth image per
// swapchain image. The framework itself only sees the `SwapchainConfig`.

use super::image::DeviceLocalImage;
use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// One attachment of a swapchain framebuffer
#[derive(Clone)]
pub struct SwapchainImageDetails {
    pub image: vk::Image,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub clear_value: vk::ClearValue,
}

/// Attachments making up the framebuffer of one swapchain image
#[derive(Clone)]
pub struct FramebufferComposition {
    pub color: SwapchainImageDetails,
    pub depth: Option<SwapchainImageDetails>,
}

impl FramebufferComposition {
    /// Color first, then depth
    pub fn attachments(&self) -> impl Iterator<Item = &SwapchainImageDetails> {
        std::iter::once(&self.color).chain(self.depth.as_ref())
    }
}

/// Everything the framework needs to know about a swapchain
#[derive(Clone)]
pub struct SwapchainConfig {
    pub swapchain: vk::SwapchainKHR,
    pub image_extent: vk::Extent2D,
    pub images: Vec<FramebufferComposition>,
}

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
    device: Arc<VulkanDevice>,
}

impl Surface {
    pub fn new<W>(device: Arc<VulkanDevice>, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window.display_handle().context("No display handle")?;
        let window = window.window_handle().context("No window handle")?;

        let surface = unsafe {
            ash_window::create_surface(
                &device.entry,
                &device.instance,
                display.as_raw(),
                window.as_raw(),
                None,
            )
            .context("Failed to create window surface")?
        };
        let loader = ash::khr::surface::Instance::new(&device.entry, &device.instance);

        let supported = unsafe {
            loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )
        };
        match supported {
            Ok(true) => {}
            Ok(false) => {
                unsafe { loader.destroy_surface(surface, None) };
                anyhow::bail!(
                    "Queue family {} cannot present to this surface",
                    device.graphics_queue_family
                );
            }
            Err(e) => {
                unsafe { loader.destroy_surface(surface, None) };
                return Err(e).context("Failed to query surface support");
            }
        }

        Ok(Self {
            surface,
            loader,
            device,
        })
    }

    pub fn capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(self.device.physical_device, self.surface)
                .context("Failed to query surface capabilities")
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// Requested mode if the surface offers it, FIFO otherwise
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// One more than the minimum, within the surface's limits
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub depth_images: Vec<DeviceLocalImage>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: &Surface,
        width: u32,
        height: u32,
        present_mode: vk::PresentModeKHR,
        clear_color: [f32; 4],
        with_depth: bool,
    ) -> Result<Self> {
        log::info!("Creating swapchain: {}x{}", width, height);

        let capabilities = surface.capabilities()?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device.physical_device, surface.surface)
        }?;
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(device.physical_device, surface.surface)
        }?;

        let surface_format = choose_surface_format(&formats).context("No suitable surface format")?;
        let present_mode = choose_present_mode(&present_modes, present_mode);
        let extent = choose_extent(&capabilities, width, height);
        let image_count = choose_image_count(&capabilities);

        log::info!(
            "Present mode: {:?}, format: {:?}, {} images requested",
            present_mode,
            surface_format.format,
            image_count
        );

        let loader = ash::khr::swapchain::Device::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(Self::color_usage())
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .context("Failed to create swapchain")?
        };

        let mut this = Self {
            swapchain,
            loader,
            images: Vec::new(),
            depth_images: Vec::new(),
            format: surface_format.format,
            extent,
            clear_color,
            device,
        };

        // From here on Drop cleans up whatever was created
        this.images = unsafe { this.loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;
        log::info!("Created swapchain with {} images", this.images.len());

        if with_depth {
            for _ in 0..this.images.len() {
                let depth = DeviceLocalImage::new(
                    &this.device,
                    extent.width,
                    extent.height,
                    DEPTH_FORMAT,
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                )?;
                this.depth_images.push(depth);
            }
        }

        Ok(this)
    }

    fn color_usage() -> vk::ImageUsageFlags {
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST
    }

    /// Describe this swapchain for `Launchpad::new()`
    pub fn config(&self) -> SwapchainConfig {
        let color_clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let depth_clear = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        };

        let images = self
            .images
            .iter()
            .enumerate()
            .map(|(i, &image)| FramebufferComposition {
                color: SwapchainImageDetails {
                    image,
                    format: self.format,
                    usage: Self::color_usage(),
                    clear_value: color_clear,
                },
                depth: self.depth_images.get(i).map(|depth| SwapchainImageDetails {
                    image: depth.image,
                    format: depth.format,
                    usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    clear_value: depth_clear,
                }),
            })
            .collect();

        SwapchainConfig {
            swapchain: self.swapchain,
            image_extent: self.extent,
            images,
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        for depth in self.depth_images.drain(..) {
            depth.destroy(&self.device);
        }
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn srgb_format_is_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, srgb.format);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, unorm.format);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(1, 8)), 2);
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let mut caps = capabilities(2, 0);
        assert_eq!(
            choose_extent(&caps, 8000, 600),
            vk::Extent2D {
                width: 4096,
                height: 600
            }
        );

        caps.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(choose_extent(&caps, 800, 600), caps.current_extent);
    }
}
