//! Per-frame resources and the frames-in-flight rotation.
//!
//! Two frame slots rotate: while the GPU consumes the commands of one
//! slot, the CPU records into the other. Each slot owns its command
//! buffer, its mapped uniform buffer, its descriptor set and its sync
//! objects, so slots never contend for anything but the swapchain images.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use aster_rhi::RhiResult;
use aster_rhi::buffer::{Buffer, BufferUsage};
use aster_rhi::command::{CommandBuffer, CommandPool};
use aster_rhi::device::Device;
use aster_rhi::sync::FrameSync;

use crate::ubo::UniformBufferObject;

/// Resources owned by one in-flight frame.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    uniform: Buffer,
    descriptor_set: vk::DescriptorSet,
    sync: FrameSync,
}

impl FrameSlot {
    fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        descriptor_set: vk::DescriptorSet,
    ) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), pool)?;
        let uniform = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            UniformBufferObject::SIZE as vk::DeviceSize,
        )?;
        let sync = FrameSync::new(device)?;

        Ok(Self {
            command_buffer,
            uniform,
            descriptor_set,
            sync,
        })
    }

    /// Command buffer this slot re-records each frame.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Persistently mapped uniform buffer for this slot.
    #[inline]
    pub fn uniform(&self) -> &Buffer {
        &self.uniform
    }

    /// Descriptor set bound while drawing with this slot.
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Synchronization objects for this slot.
    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }
}

/// The rotating set of frame slots.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameSlots {
    /// Creates one slot per descriptor set.
    ///
    /// Callers pass [`MAX_FRAMES_IN_FLIGHT`] pre-allocated sets; the sets
    /// still need their buffer and sampler writes after this returns.
    ///
    /// [`MAX_FRAMES_IN_FLIGHT`]: aster_rhi::sync::MAX_FRAMES_IN_FLIGHT
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        descriptor_sets: Vec<vk::DescriptorSet>,
    ) -> RhiResult<Self> {
        let mut slots = Vec::with_capacity(descriptor_sets.len());
        for descriptor_set in descriptor_sets {
            slots.push(FrameSlot::new(device.clone(), pool, descriptor_set)?);
        }

        debug!("Created {} frame slots", slots.len());

        Ok(Self { slots, current: 0 })
    }

    /// Slot the next frame records into.
    #[inline]
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    /// Index of the current slot.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// All slots, for descriptor wiring at startup.
    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }

    /// Rotates to the next slot after a frame is submitted.
    pub fn advance(&mut self) {
        self.current = next_index(self.current, self.slots.len());
    }
}

fn next_index(current: usize, len: usize) -> usize {
    (current + 1) % len
}

#[cfg(test)]
mod tests {
    use super::*;
    use aster_rhi::sync::MAX_FRAMES_IN_FLIGHT;

    #[test]
    fn test_next_index_round_robin() {
        assert_eq!(next_index(0, MAX_FRAMES_IN_FLIGHT), 1);
        assert_eq!(next_index(1, MAX_FRAMES_IN_FLIGHT), 0);
    }

    #[test]
    fn test_next_index_visits_every_slot() {
        let len = MAX_FRAMES_IN_FLIGHT;
        let mut seen = vec![false; len];
        let mut index = 0;
        for _ in 0..len {
            seen[index] = true;
            index = next_index(index, len);
        }
        assert!(seen.iter().all(|&visited| visited));
        // A full cycle returns to the start.
        assert_eq!(index, 0);
    }

    #[test]
    fn test_next_index_single_slot_stays_put() {
        assert_eq!(next_index(0, 1), 0);
    }
}
