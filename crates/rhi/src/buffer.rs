//! GPU buffer management.
//!
//! # Overview
//!
//! [`Buffer`] pairs a VkBuffer with its own dedicated VkDeviceMemory
//! allocation; the memory type is chosen from the usage's required
//! properties. Two families exist:
//!
//! - Device-local buffers (vertex, index) are filled once through a
//!   staging copy and never touched by the CPU again.
//! - Host-visible buffers (staging, uniform) are mapped once at creation
//!   and stay mapped, so a per-frame write is a plain memcpy into
//!   host-coherent memory with no map/unmap traffic.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use aster_rhi::device::Device;
//! use aster_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), aster_rhi::RhiError> {
//! let staging = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Staging,
//!     bytemuck::cast_slice(&[0.0f32, 0.5, -0.5]),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// How a buffer will be used; decides usage flags and memory properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled via staging copy.
    Vertex,
    /// Device-local index data, filled via staging copy.
    Index,
    /// Host-visible uniform data, persistently mapped and rewritten per
    /// frame.
    Uniform,
    /// Host-visible transfer source for one-shot uploads.
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Memory properties the backing allocation must have.
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Uniform | BufferUsage::Staging => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Whether buffers of this usage are CPU-writable (and stay mapped).
    pub fn is_host_visible(self) -> bool {
        self.memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Vulkan buffer with dedicated memory.
///
/// Host-visible buffers hold a live mapping for their whole lifetime; the
/// pointer is private and only reachable through [`Buffer::write_data`].
/// Not thread-safe.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: BufferUsage,
    mapped: *mut u8,
}

impl Buffer {
    /// Creates a buffer and binds freshly allocated memory to it.
    ///
    /// Host-visible usages are mapped immediately and stay mapped until
    /// drop.
    ///
    /// # Errors
    ///
    /// Fails on a zero size, when no memory type satisfies the usage, or
    /// when any Vulkan call fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::Buffer(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let memory = match device.allocate_memory(requirements, usage.memory_properties()) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            device.handle().bind_buffer_memory(buffer, memory, 0)?;
        }

        let mapped = if usage.is_host_visible() {
            let ptr = unsafe {
                device
                    .handle()
                    .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?
            };
            ptr as *mut u8
        } else {
            std::ptr::null_mut()
        };

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            usage,
            mapped,
        })
    }

    /// Creates a host-visible buffer pre-filled with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    ///
    /// The backing memory is host-coherent, so the write is visible to the
    /// GPU without an explicit flush.
    ///
    /// # Errors
    ///
    /// Fails when the buffer is device-local (never mapped) or the write
    /// would run past the end of the buffer.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        if self.mapped.is_null() {
            return Err(RhiError::Buffer(format!(
                "{} buffer is device-local and cannot be written directly",
                self.usage.name()
            )));
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::Buffer(format!(
                "write exceeds buffer size: offset {} + len {} > size {}",
                offset,
                data.len(),
                self.size
            )));
        }

        // SAFETY: mapped covers [0, size) and the bounds were checked above.
        unsafe {
            let dst = self.mapped.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.device.handle().unmap_memory(self.memory);
            }
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_flags_match_role() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn geometry_buffers_are_device_local() {
        assert_eq!(
            BufferUsage::Vertex.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            BufferUsage::Index.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert!(!BufferUsage::Vertex.is_host_visible());
        assert!(!BufferUsage::Index.is_host_visible());
    }

    #[test]
    fn cpu_written_buffers_are_host_coherent() {
        for usage in [BufferUsage::Uniform, BufferUsage::Staging] {
            assert!(usage.is_host_visible());
            assert!(
                usage
                    .memory_properties()
                    .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
            );
        }
    }
}
