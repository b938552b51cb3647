//! GPU image creation and layout transitions.
//!
//! # Overview
//!
//! - [`Image`] owns a VkImage, its device-local memory and a full-range
//!   view; everything is released in [`Drop`].
//! - [`mip_level_count`] computes the full mip chain length for an extent.
//! - [`Image::record_layout_transition`] records the small set of layout
//!   transitions the renderer needs; anything else is rejected.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of mip levels for a full chain over a `width` x `height` base,
/// i.e. `floor(log2(max(width, height))) + 1` computed without floats.
#[inline]
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Whether `format` carries a stencil aspect alongside depth.
#[inline]
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Creation parameters for [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            format: vk::Format::R8G8B8A8_SRGB,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            usage: vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

/// Owned 2D image with device-local backing memory and a view over the
/// whole mip chain.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Image {
    /// Creates an optimally-tiled 2D image and binds fresh device-local
    /// memory to it.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&create_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory =
            match device.allocate_memory(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(memory) => memory,
                Err(err) => {
                    unsafe { device.handle().destroy_image(image, None) };
                    return Err(err);
                }
            };

        unsafe {
            if let Err(err) = device.handle().bind_image_memory(image, memory, 0) {
                device.handle().destroy_image(image, None);
                device.handle().free_memory(memory, None);
                return Err(err.into());
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { device.handle().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(err) => {
                unsafe {
                    device.handle().destroy_image(image, None);
                    device.handle().free_memory(memory, None);
                }
                return Err(err.into());
            }
        };

        debug!(
            "Image created: {}x{}, {:?}, {} mip level(s), {:?}",
            desc.width, desc.height, desc.format, desc.mip_levels, desc.samples
        );

        Ok(Self {
            device,
            image,
            memory,
            view,
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels,
        })
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the full-range image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the base extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of mip levels.
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Records a whole-image layout transition into `cmd`.
    ///
    /// Only the transitions the renderer actually performs are supported;
    /// an unrecognized pair fails with
    /// [`RhiError::UnsupportedLayoutTransition`] instead of guessing
    /// access masks.
    pub fn record_layout_transition(
        &self,
        cmd: &crate::command::CommandBuffer,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> RhiResult<()> {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(from, to)?;

        let aspect = if to == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
            if has_stencil_component(self.format) {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        };

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(from)
            .new_layout(to)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: self.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);
        Ok(())
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!(
            "Image destroyed: {}x{}, {:?}",
            self.extent.width, self.extent.height, self.format
        );
    }
}

type TransitionMasks = (
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
);

fn transition_masks(from: vk::ImageLayout, to: vk::ImageLayout) -> RhiResult<TransitionMasks> {
    match (from, to) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )),
        _ => Err(RhiError::UnsupportedLayoutTransition { from, to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_square_power_of_two() {
        assert_eq!(mip_level_count(512, 512), 10);
    }

    #[test]
    fn mip_count_single_texel() {
        assert_eq!(mip_level_count(1, 1), 1);
    }

    #[test]
    fn mip_count_uses_larger_dimension() {
        // floor(log2(300)) + 1 = 9, regardless of the smaller axis.
        assert_eq!(mip_level_count(300, 100), 9);
        assert_eq!(mip_level_count(100, 300), 9);
    }

    #[test]
    fn mip_count_zero_extent_clamps_to_one_level() {
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn stencil_detection() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(!has_stencil_component(vk::Format::R8G8B8A8_SRGB));
    }

    #[test]
    fn known_transitions_have_masks() {
        assert!(transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        )
        .is_ok());
        assert!(transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_ok());
        assert!(transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        )
        .is_ok());
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let err = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition { .. }
        ));
    }

    #[test]
    fn default_desc_is_single_sample_color() {
        let desc = ImageDesc::default();
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
    }
}
