//! Sampled textures with generated mip chains.
//!
//! # Overview
//!
//! [`Texture::from_rgba8`] takes decoded RGBA8 pixels and produces a
//! device-local, mip-mapped, sampled image:
//!
//! 1. Pixels go into a host-visible staging buffer.
//! 2. A one-time command buffer copies them into mip 0 and then blits each
//!    level from the previous one, ending with every level in
//!    `SHADER_READ_ONLY_OPTIMAL`.
//! 3. A linear-filtering sampler with anisotropy covers the whole chain.
//!
//! Generating mips by blit requires the format to support linear blit
//! filtering; creation fails up front when it does not.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, submit_one_time};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, mip_level_count};

/// Device-local sampled texture with a full mip chain and its sampler.
pub struct Texture {
    device: Arc<Device>,
    image: Image,
    sampler: vk::Sampler,
}

impl Texture {
    /// Uploads RGBA8 pixel data into a mip-mapped `R8G8B8A8_SRGB` texture.
    ///
    /// Blocks on the graphics queue until the upload and mip generation
    /// finish, so the staging buffer can be released before returning.
    ///
    /// # Errors
    ///
    /// - [`RhiError::UnsupportedFormat`] when the device cannot blit the
    ///   texture format with linear filtering.
    /// - [`RhiError::Buffer`] when `pixels` does not match the extent.
    pub fn from_rgba8(
        device: Arc<Device>,
        instance: &ash::Instance,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(RhiError::Buffer(format!(
                "texture data is {} bytes, expected {} for {}x{} RGBA8",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        let format = vk::Format::R8G8B8A8_SRGB;
        if !device.physical_device().supports_linear_blit(instance, format) {
            return Err(RhiError::UnsupportedFormat(format!(
                "{:?} does not support linear blit filtering needed for mipmap generation",
                format
            )));
        }

        let mip_levels = mip_level_count(width, height);

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let image = Image::new(
            device.clone(),
            &ImageDesc {
                width,
                height,
                format,
                mip_levels,
                samples: vk::SampleCountFlags::TYPE_1,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        submit_one_time(&device, pool, |cmd| {
            image.record_layout_transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            record_mipmap_chain(cmd, &image);
            Ok(())
        })?;
        // Upload is fully drained; the staging buffer can go away now.
        drop(staging);

        let sampler = create_sampler(&device, mip_levels)?;

        debug!(
            "Texture uploaded: {}x{}, {} mip level(s)",
            width, height, mip_levels
        );

        Ok(Self {
            device,
            image,
            sampler,
        })
    }

    /// Returns the underlying image.
    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Returns the view covering the whole mip chain.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Returns the texture sampler.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Returns the number of mip levels.
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Texture destroyed");
    }
}

/// Extent of the mip level below `(width, height)`, never shrinking past
/// one texel on either axis.
#[inline]
fn next_mip_extent(width: i32, height: i32) -> (i32, i32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// Records the downsampling blit chain over every mip level of `image`.
///
/// Level 0 must already be in `TRANSFER_DST_OPTIMAL` with its texels
/// written. On replay every level ends in `SHADER_READ_ONLY_OPTIMAL`.
fn record_mipmap_chain(cmd: &CommandBuffer, image: &Image) {
    let mut barrier = vk::ImageMemoryBarrier::default()
        .image(image.handle())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let extent = image.extent();
    let mut mip_width = extent.width as i32;
    let mut mip_height = extent.height as i32;

    for level in 1..image.mip_levels() {
        // Previous level becomes the blit source.
        barrier.subresource_range.base_mip_level = level - 1;
        barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
        barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            &[barrier],
        );

        let (dst_width, dst_height) = next_mip_extent(mip_width, mip_height);

        let blit = vk::ImageBlit::default()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level - 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: mip_width,
                    y: mip_height,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst_width,
                    y: dst_height,
                    z: 1,
                },
            ]);
        cmd.blit_image(
            image.handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::LINEAR,
        );

        // Source level is final; hand it to the fragment shader.
        barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
        barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[barrier],
        );

        mip_width = dst_width;
        mip_height = dst_height;
    }

    // The last level was only ever a blit destination.
    barrier.subresource_range.base_mip_level = image.mip_levels() - 1;
    barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
    barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[barrier],
    );
}

fn create_sampler(device: &Arc<Device>, mip_levels: u32) -> RhiResult<vk::Sampler> {
    let max_anisotropy = device
        .physical_device()
        .properties
        .limits
        .max_sampler_anisotropy;

    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(mip_levels as f32);

    let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
    Ok(sampler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_extent_halves_and_floors() {
        assert_eq!(next_mip_extent(512, 512), (256, 256));
        assert_eq!(next_mip_extent(300, 100), (150, 50));
        assert_eq!(next_mip_extent(5, 3), (2, 1));
    }

    #[test]
    fn mip_extent_never_drops_below_one_texel() {
        assert_eq!(next_mip_extent(1, 1), (1, 1));
        assert_eq!(next_mip_extent(1, 64), (1, 32));
    }

    #[test]
    fn halving_chain_matches_mip_count() {
        // Walking the chain down to 1x1 visits exactly mip_level_count levels.
        for (w, h) in [(512u32, 512u32), (300, 100), (1, 1), (1920, 1080)] {
            let (mut cw, mut ch) = (w as i32, h as i32);
            let mut levels = 1;
            while (cw, ch) != (1, 1) {
                let (nw, nh) = next_mip_extent(cw, ch);
                cw = nw;
                ch = nh;
                levels += 1;
            }
            assert_eq!(levels, mip_level_count(w, h), "extent {}x{}", w, h);
        }
    }
}
