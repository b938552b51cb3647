//! Render pass and framebuffer construction.
//!
//! # Overview
//!
//! One render pass drives the whole frame. Its attachment set depends on
//! the sample count picked at startup:
//!
//! - Multisampled: MSAA color target, MSAA depth, and a single-sample
//!   resolve attachment (the swapchain image) that ends in
//!   `PRESENT_SRC_KHR`.
//! - Single-sample: the swapchain image is the color target directly and
//!   ends in `PRESENT_SRC_KHR`; depth rides along.
//!
//! Framebuffer attachment order mirrors the attachment descriptions, so
//! [`RenderPass::create_framebuffers`] owns that pairing.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// The renderer's single render pass.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    samples: vk::SampleCountFlags,
}

impl RenderPass {
    /// Builds the render pass for the given formats and sample count.
    ///
    /// An external-to-first-subpass dependency orders color and depth
    /// writes behind the previous frame's use of the same attachments.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let attachments = describe_attachments(color_format, depth_format, samples);
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_ref = vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };

        let color_refs = [color_ref];
        let resolve_refs = [resolve_ref];

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);
        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Render pass created: color {:?}, depth {:?}, {:?}",
            color_format, depth_format, samples
        );

        Ok(Self {
            device,
            render_pass,
            samples,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the sample count this pass was built for.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// True when the pass renders into an MSAA target and resolves.
    #[inline]
    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }

    /// Creates one framebuffer per swapchain image view.
    ///
    /// `msaa_color_view` must be `Some` exactly when the pass is
    /// multisampled; the attachment order then is MSAA color, depth,
    /// swapchain resolve target. Single-sample order is swapchain color,
    /// depth.
    pub fn create_framebuffers(
        &self,
        extent: vk::Extent2D,
        swapchain_views: &[vk::ImageView],
        msaa_color_view: Option<vk::ImageView>,
        depth_view: vk::ImageView,
    ) -> RhiResult<Vec<Framebuffer>> {
        if self.is_multisampled() != msaa_color_view.is_some() {
            return Err(RhiError::Pipeline(format!(
                "framebuffer attachments do not match render pass sample count {:?}",
                self.samples
            )));
        }

        swapchain_views
            .iter()
            .map(|&target| {
                let attachments: Vec<vk::ImageView> = match msaa_color_view {
                    Some(color) => vec![color, depth_view, target],
                    None => vec![target, depth_view],
                };

                let create_info = vk::FramebufferCreateInfo::default()
                    .render_pass(self.render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);

                let framebuffer =
                    unsafe { self.device.handle().create_framebuffer(&create_info, None)? };
                Ok(Framebuffer {
                    device: self.device.clone(),
                    framebuffer,
                })
            })
            .collect()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

/// Owned framebuffer; dropped and rebuilt on every swapchain recreation.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Attachment descriptions in the order the subpass references them.
fn describe_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Vec<vk::AttachmentDescription> {
    let multisampled = samples != vk::SampleCountFlags::TYPE_1;

    // Single-sample color presents directly; MSAA color stays an
    // attachment and a separate resolve target presents.
    let color_final_layout = if multisampled {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::PRESENT_SRC_KHR
    };

    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(color_final_layout);

    // Depth contents are never read after the frame.
    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let mut attachments = vec![color, depth];

    if multisampled {
        let resolve = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);
        attachments.push(resolve);
    }

    attachments
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_SRGB;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn multisampled_pass_resolves_to_present() {
        let attachments = describe_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_8);
        assert_eq!(attachments.len(), 3);

        assert_eq!(attachments[0].samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!(
            attachments[0].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );

        assert_eq!(attachments[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn single_sample_pass_presents_directly() {
        let attachments = describe_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn color_and_depth_clear_on_load() {
        let attachments = describe_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments[1].load_op, vk::AttachmentLoadOp::CLEAR);
    }

    #[test]
    fn depth_contents_are_discarded_after_frame() {
        let attachments = describe_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachments[1].samples, vk::SampleCountFlags::TYPE_4);
    }
}
