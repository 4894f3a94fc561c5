// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync, plus the host-side
// bookkeeping of which swapchain image is guarded by which frame slot.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;

/// Number of frames that may be in flight at the same time
pub const CONCURRENT_FRAMES: usize = 1;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            Ok(Self {
                image_available: device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create image-available semaphore")?,
                render_finished: device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create render-finished semaphore")?,
                in_flight_fence: device
                    .device
                    .create_fence(&fence_info, None)
                    .context("Failed to create frame fence")?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Host-side frame bookkeeping.
///
/// Tracks the running frame id, the frame-in-flight slot in use, the
/// swapchain image acquired for the current frame and, per swapchain image,
/// the slot whose fence guards the last submission that presented it.
#[derive(Debug, Clone)]
pub struct FrameTracker {
    frame_id: Option<u64>,
    concurrent_frames: usize,
    current_slot: usize,
    images_in_flight: Vec<Option<usize>>,
    // Acquired and not yet presented
    acquired: Option<u32>,
    last_acquired: Option<u32>,
}

impl FrameTracker {
    pub fn new(image_count: usize, concurrent_frames: usize) -> Self {
        Self {
            frame_id: None,
            concurrent_frames: concurrent_frames.max(1),
            current_slot: 0,
            images_in_flight: vec![None; image_count],
            acquired: None,
            last_acquired: None,
        }
    }

    /// Advance to the next frame and return its slot
    pub fn begin_frame(&mut self) -> usize {
        let id = self.frame_id.map_or(0, |id| id + 1);
        self.frame_id = Some(id);
        self.current_slot = (id % self.concurrent_frames as u64) as usize;
        self.current_slot
    }

    /// Id of the current frame, `None` before the first `begin_frame()`
    pub fn frame_id(&self) -> Option<u64> {
        self.frame_id
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Forget every image mapped to `slot`. Call after the slot's fence has
    /// been waited on. Returns how many mappings were cleared.
    pub fn release_slot(&mut self, slot: usize) -> usize {
        let mut released = 0;
        for mapping in &mut self.images_in_flight {
            if *mapping == Some(slot) {
                *mapping = None;
                released += 1;
            }
        }
        released
    }

    /// Slot whose fence must be waited on before `image` can be reused
    pub fn slot_guarding(&self, image: u32) -> Option<usize> {
        self.images_in_flight.get(image as usize).copied().flatten()
    }

    /// Record that `image` was acquired for the current frame. The slot's
    /// fence is reset from here on until the frame is finished.
    pub fn image_acquired(&mut self, image: u32) {
        self.acquired = Some(image);
        self.last_acquired = Some(image);
    }

    /// Image of the current frame, `None` once it has been presented
    pub fn acquired_image(&self) -> Option<u32> {
        self.acquired
    }

    /// Image of the most recent frame, presented or not
    pub fn last_acquired_image(&self) -> Option<u32> {
        self.last_acquired
    }

    /// Close the current frame. Returns the image that still has to be
    /// presented, `None` when nothing was acquired or it was already
    /// presented.
    pub fn finish_frame(&mut self) -> Option<u32> {
        self.acquired.take()
    }

    pub fn mark_image_in_flight(&mut self, image: u32, slot: usize) {
        if let Some(mapping) = self.images_in_flight.get_mut(image as usize) {
            *mapping = Some(slot);
        } else {
            log::warn!(
                "Swapchain image index {} out of range ({} images)",
                image,
                self.images_in_flight.len()
            );
        }
    }
}

/// How many of the oldest single-use command buffers to free before a new
/// one is recorded, so that at most `max(image_count, concurrent_frames)`
/// remain.
pub fn command_buffers_to_retire(len: usize, image_count: usize, concurrent_frames: usize) -> usize {
    len.saturating_sub(image_count.max(concurrent_frames))
}
