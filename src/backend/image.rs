// Device-local images with a full mip chain
//
// Usable on their own with just a `VulkanDevice`, e.g. for depth buffers
// that must exist before the framework is created.

use super::VulkanDevice;
use crate::error::LaunchpadError;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

/// `1 + floor(log2(max(width, height)))`
pub fn mip_levels(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

pub fn is_block_compressed(format: vk::Format) -> bool {
    let bc = vk::Format::BC1_RGB_UNORM_BLOCK.as_raw()..=vk::Format::BC7_SRGB_BLOCK.as_raw();
    bc.contains(&format.as_raw())
}

/// BC formats need `textureCompressionBC`
pub fn check_image_format(
    format: vk::Format,
    features: &vk::PhysicalDeviceFeatures,
) -> Result<(), LaunchpadError> {
    if is_block_compressed(format) && features.texture_compression_bc == vk::FALSE {
        return Err(LaunchpadError::MissingFeature("textureCompressionBC"));
    }
    Ok(())
}

pub struct DeviceLocalImage {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub array_layers: u32,
    allocation: Option<Allocation>,
}

impl DeviceLocalImage {
    /// Single-layer 2D image
    pub fn new(
        device: &VulkanDevice,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        Self::with_layers(
            device,
            width,
            height,
            format,
            usage,
            1,
            vk::ImageCreateFlags::empty(),
        )
    }

    /// 2D image with `array_layers` layers, e.g. 6 with `CUBE_COMPATIBLE`
    pub fn with_layers(
        device: &VulkanDevice,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        array_layers: u32,
        flags: vk::ImageCreateFlags,
    ) -> Result<Self> {
        check_image_format(format, &device.enabled_features)?;
        let mip_levels = mip_levels(width, height);

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(array_layers)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .device
                .create_image(&image_info, None)
                .context("Failed to create image")?
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name: "device-local image",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).context("Failed to allocate image memory");
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            let _ = device.allocator.lock().free(allocation);
            unsafe { device.device.destroy_image(image, None) };
            return Err(e).context("Failed to bind image memory");
        }

        log::debug!(
            "Created image {}x{} {:?}, {} levels, {} layers",
            width,
            height,
            format,
            mip_levels,
            array_layers
        );

        Ok(Self {
            image,
            format,
            extent: vk::Extent2D { width, height },
            mip_levels,
            array_layers,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator.lock().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }
        unsafe { device.device.destroy_image(self.image, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mip_chain() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(2, 1), 2);
        assert_eq!(mip_levels(256, 256), 9);
        assert_eq!(mip_levels(800, 600), 10);
        assert_eq!(mip_levels(1, 1024), 11);
        assert_eq!(mip_levels(1023, 3), 10);
    }

    #[test]
    fn zero_extent_still_has_one_level() {
        assert_eq!(mip_levels(0, 0), 1);
    }

    #[test]
    fn bc_images_need_bc_support() {
        let without = vk::PhysicalDeviceFeatures::default();
        let with = vk::PhysicalDeviceFeatures {
            texture_compression_bc: vk::TRUE,
            ..Default::default()
        };

        for format in [vk::Format::BC1_RGB_SRGB_BLOCK, vk::Format::BC3_SRGB_BLOCK, vk::Format::BC7_SRGB_BLOCK] {
            assert!(matches!(
                check_image_format(format, &without),
                Err(LaunchpadError::MissingFeature("textureCompressionBC"))
            ));
            assert!(check_image_format(format, &with).is_ok());
        }
        assert!(check_image_format(vk::Format::R8G8B8A8_SRGB, &without).is_ok());
        assert!(check_image_format(vk::Format::D32_SFLOAT, &without).is_ok());
    }
}
