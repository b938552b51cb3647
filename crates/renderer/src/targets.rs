//! Per-swapchain render target images.
//!
//! The depth image and, when multisampling, the intermediate color image
//! match the swapchain extent, so they are torn down and rebuilt together
//! with the swapchain on resize. Framebuffers tie them to each swapchain
//! image view.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use aster_rhi::RhiResult;
use aster_rhi::command::{CommandPool, submit_one_time};
use aster_rhi::device::Device;
use aster_rhi::image::{Image, ImageDesc};
use aster_rhi::physical_device::PhysicalDeviceInfo;
use aster_rhi::render_pass::{Framebuffer, RenderPass};
use aster_rhi::swapchain::Swapchain;

/// Depth formats in preference order; the first one the device supports for
/// optimal-tiling depth attachments wins.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the depth attachment format for this device.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: &PhysicalDeviceInfo,
) -> RhiResult<vk::Format> {
    physical_device.find_supported_format(
        instance,
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// Offscreen images and framebuffers for one swapchain generation.
pub struct RenderTargets {
    msaa_color: Option<Image>,
    depth: Image,
    framebuffers: Vec<Framebuffer>,
}

impl RenderTargets {
    /// Creates targets sized to the swapchain's current extent.
    ///
    /// The multisampled color image is only allocated when `render_pass`
    /// resolves; single-sample passes draw straight into the swapchain
    /// image. Both offscreen images carry the render pass sample count.
    pub fn new(
        device: Arc<Device>,
        instance: &ash::Instance,
        pool: &CommandPool,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let extent = swapchain.extent();

        let msaa_color = if render_pass.is_multisampled() {
            Some(Image::new(
                device.clone(),
                &ImageDesc {
                    width: extent.width,
                    height: extent.height,
                    format: swapchain.format(),
                    mip_levels: 1,
                    samples: render_pass.samples(),
                    usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                        | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                    aspect: vk::ImageAspectFlags::COLOR,
                },
            )?)
        } else {
            None
        };

        let depth = Image::new(
            device.clone(),
            &ImageDesc {
                width: extent.width,
                height: extent.height,
                format: depth_format,
                mip_levels: 1,
                samples: render_pass.samples(),
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: vk::ImageAspectFlags::DEPTH,
            },
        )?;

        // The render pass expects the depth attachment already in
        // DEPTH_STENCIL_ATTACHMENT_OPTIMAL at first use.
        submit_one_time(&device, pool, |cmd| {
            depth.record_layout_transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )
        })?;

        let framebuffers = render_pass.create_framebuffers(
            extent,
            swapchain.image_views(),
            msaa_color.as_ref().map(|image| image.view()),
            depth.view(),
        )?;

        debug!(
            "Render targets created: {}x{}, depth {:?}, samples {:?}",
            extent.width,
            extent.height,
            depth_format,
            render_pass.samples()
        );

        Ok(Self {
            msaa_color,
            depth,
            framebuffers,
        })
    }

    /// Framebuffer for the given swapchain image index.
    #[inline]
    pub fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index].handle()
    }

    /// Returns the multisampled color image, if the pass resolves.
    #[inline]
    pub fn msaa_color(&self) -> Option<&Image> {
        self.msaa_color.as_ref()
    }

    /// Returns the depth image.
    #[inline]
    pub fn depth(&self) -> &Image {
        &self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aster_rhi::image::has_stencil_component;

    #[test]
    fn test_depth_candidates_prefer_stencil_free_format() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert!(!has_stencil_component(DEPTH_FORMAT_CANDIDATES[0]));
    }

    #[test]
    fn test_depth_candidate_fallbacks_carry_stencil() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }
}
