// Buffer utilities and raw memory allocation
//
// Buffers are backed by gpu-allocator allocations. Host-coherent buffers
// live in CpuToGpu memory and stay mapped for their whole lifetime.

use super::VulkanDevice;
use crate::error::LaunchpadError;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

/// A buffer together with the memory backing it
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    allocation: Option<Allocation>,
}

impl Buffer {
    pub fn new(
        device: &VulkanDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for {}", name));
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            let _ = device.allocator.lock().free(allocation);
            unsafe { device.device.destroy_buffer(buffer, None) };
            return Err(e).context("Failed to bind buffer memory");
        }

        log::debug!("Created buffer {} ({} bytes, {:?})", name, size, location);

        Ok(Self {
            buffer,
            size,
            usage,
            location,
            allocation: Some(allocation),
        })
    }

    /// Copy `data` into the buffer at `offset`. Only works for host-visible
    /// buffers.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        check_copy_bounds(offset, data.len(), self.size)?;

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .with_context(|| format!("Buffer {:?} is not host visible", self.buffer))?;

        mapped[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn destroy(mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
        unsafe { device.device.destroy_buffer(self.buffer, None) };
    }
}

/// Reject copies that would write past the end of a buffer
pub fn check_copy_bounds(
    offset: usize,
    len: usize,
    size: vk::DeviceSize,
) -> Result<(), LaunchpadError> {
    match offset.checked_add(len) {
        Some(end) if end as u64 <= size => Ok(()),
        _ => Err(LaunchpadError::CopyOutOfBounds { offset, len, size }),
    }
}

/// Find the first memory type allowed by `type_filter` whose flags contain
/// all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, LaunchpadError> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let allowed = type_filter & (1 << i) != 0;
            allowed
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(LaunchpadError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

/// Allocation info for at least `size` bytes satisfying `requirements`
pub fn memory_allocate_info(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    size: vk::DeviceSize,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::MemoryAllocateInfo<'static>, LaunchpadError> {
    let memory_type_index =
        find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

    Ok(vk::MemoryAllocateInfo::default()
        .allocation_size(size.max(requirements.size))
        .memory_type_index(memory_type_index))
}

/// Allocate raw device memory outside the allocator. The caller frees it
/// with `vkFreeMemory`.
pub fn allocate_memory_for_requirements(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let alloc_info = memory_allocate_info(&device.memory_properties, size, requirements, properties)?;

    unsafe {
        device.device.allocate_memory(&alloc_info, None).with_context(|| {
            format!(
                "Failed to allocate {} bytes (alignment {}, type bits {:#b})",
                alloc_info.allocation_size, requirements.alignment, requirements.memory_type_bits
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            properties.memory_types[i].property_flags = flags;
        }
        properties
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn memory_type_needs_all_requested_flags() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            HOST,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, HOST).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
    }

    #[test]
    fn memory_type_respects_type_filter() {
        let props = memory_properties(&[HOST, HOST]);
        assert_eq!(find_memory_type(&props, 0b10, HOST).unwrap(), 1);
        assert!(matches!(
            find_memory_type(&props, 0b100, HOST),
            Err(LaunchpadError::NoSuitableMemoryType { .. })
        ));
    }

    #[test]
    fn allocation_size_is_at_least_the_requirement() {
        let props = memory_properties(&[HOST]);
        let requirements = vk::MemoryRequirements {
            size: 256,
            alignment: 64,
            memory_type_bits: 1,
        };

        let info = memory_allocate_info(&props, 100, requirements, HOST).unwrap();
        assert_eq!(info.allocation_size, 256);

        let info = memory_allocate_info(&props, 1000, requirements, HOST).unwrap();
        assert_eq!(info.allocation_size, 1000);
        assert_eq!(info.memory_type_index, 0);
    }

    #[test]
    fn copies_must_fit_the_buffer() {
        assert!(check_copy_bounds(0, 64, 64).is_ok());
        assert!(check_copy_bounds(60, 4, 64).is_ok());
        assert!(check_copy_bounds(0, 0, 0).is_ok());
        assert!(matches!(
            check_copy_bounds(61, 4, 64),
            Err(LaunchpadError::CopyOutOfBounds { offset: 61, len: 4, size: 64 })
        ));
        assert!(check_copy_bounds(usize::MAX, 2, 64).is_err());
    }

    #[test]
    fn allocator_uses_the_same_vulkan_types_as_ash() {
        // Allocations are bound with ash, so both must agree on the handle types
        let _memory: unsafe fn(&Allocation) -> vk::DeviceMemory = Allocation::memory;
        let _desc: fn(gpu_allocator::vulkan::AllocatorCreateDesc) = |desc| {
            let _: &ash::Instance = &desc.instance;
            let _: &ash::Device = &desc.device;
            let _: vk::PhysicalDevice = desc.physical_device;
        };
    }
}
