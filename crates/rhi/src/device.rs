//! Vulkan logical device and queue management.
//!
//! # Overview
//!
//! The [`Device`] wraps the logical device, the graphics/present queues,
//! and raw device-memory allocation. Allocation goes straight through
//! `vkAllocateMemory` after picking a memory type from the physical
//! device's table; there is no sub-allocating layer, which keeps the
//! mapping between a buffer or image and its memory one-to-one.
//!
//! # Example
//!
//! ```no_run
//! use aster_rhi::instance::Instance;
//! use aster_rhi::physical_device::select_physical_device;
//! use aster_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(&[], false).expect("instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("no suitable GPU");
//! let device = Device::new(&instance, &info).expect("device");
//! let graphics_queue = device.graphics_queue();
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
///
/// Shared across the RHI as `Arc<Device>`; every resource wrapper holds a
/// clone so teardown order only depends on drop order of the wrappers.
pub struct Device {
    device: ash::Device,
    physical_device: PhysicalDeviceInfo,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl Device {
    /// Creates the logical device with one queue per unique family.
    ///
    /// Enables exactly the features the pipeline relies on: sampler
    /// anisotropy for the texture sampler and sample-rate shading for
    /// smoother MSAA interiors.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = &physical_device.queue_families;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .sample_rate_shading(true);

        let extension_names: Vec<*const i8> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device.device, &create_info, None)?
        };

        info!("Logical device created");

        // Queue families are Some by construction: selection rejects devices
        // with incomplete families before we get here.
        let graphics_family = queue_families.graphics_family.ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families.present_family.ok_or(RhiError::NoSuitableGpu)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved (graphics family {}, present family {})",
            graphics_family, present_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device.clone(),
            graphics_queue,
            present_queue,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device this device was created from.
    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.physical_device.queue_families
    }

    /// Allocates device memory for the given requirements.
    ///
    /// Picks the first memory type that satisfies both the requirement's
    /// type bits and `properties`. The caller owns the returned memory and
    /// must free it (the buffer/image wrappers do this in their Drop).
    ///
    /// # Errors
    ///
    /// [`RhiError::NoSuitableMemoryType`] when the device offers no
    /// compatible type; otherwise the raw Vulkan error.
    pub fn allocate_memory(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<vk::DeviceMemory> {
        let type_index = self
            .physical_device
            .find_memory_type(requirements.memory_type_bits, properties)
            .ok_or(RhiError::NoSuitableMemoryType {
                type_bits: requirements.memory_type_bits,
                properties,
            })?;

        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);

        let memory = unsafe { self.device.allocate_memory(&allocate_info, None)? };
        Ok(memory)
    }

    /// Blocks until every queue on the device is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// Command buffers must be fully recorded and the fence, if any, must
    /// be unsignaled and not in use by a previous submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("device_wait_idle failed during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, queue handles are plain u64 handles,
// and PhysicalDeviceInfo is a snapshot of immutable data.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_extension_is_required() {
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
