//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct that owns every Vulkan
//! resource and drives the per-frame loop: acquire, record, submit,
//! present.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use aster_core::{Error, Result, Timer};
use aster_platform::{Surface, Window, required_extensions};
use aster_resources::{MeshData, ResourceError, TextureData};
use aster_rhi::command::CommandPool;
use aster_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, bindings, buffer_info, image_info, update_descriptor_sets,
};
use aster_rhi::device::Device;
use aster_rhi::instance::Instance;
use aster_rhi::physical_device::select_physical_device;
use aster_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use aster_rhi::render_pass::RenderPass;
use aster_rhi::shader::{Shader, ShaderStage};
use aster_rhi::swapchain::{AcquiredImage, Swapchain};
use aster_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use aster_rhi::texture::Texture;
use aster_rhi::vertex::MeshVertex;
use aster_rhi::{RhiError, RhiResult};

use crate::frame::FrameSlots;
use crate::mesh::MeshBuffers;
use crate::targets::{self, RenderTargets};
use crate::ubo::UniformBufferObject;

/// OBJ model rendered at startup.
pub const MODEL_PATH: &str = "assets/models/viking_room.obj";
/// Texture sampled by the fragment shader.
pub const TEXTURE_PATH: &str = "assets/textures/viking_room.png";
/// Pre-compiled SPIR-V vertex shader.
pub const VERT_SHADER_PATH: &str = "assets/shaders/mesh.vert.spv";
/// Pre-compiled SPIR-V fragment shader.
pub const FRAG_SHADER_PATH: &str = "assets/shaders/mesh.frag.spv";

/// Background color, opaque black.
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Minimum fraction of samples shaded when sample shading is on.
const MIN_SAMPLE_SHADING: f32 = 0.2;

fn render_err(e: RhiError) -> Error {
    Error::Render(e.to_string())
}

fn asset_err(e: ResourceError) -> Error {
    Error::Asset(e.to_string())
}

/// Owns the full Vulkan stack and renders the spinning model.
///
/// # Teardown
///
/// Every field wraps a RAII type whose `Drop` destroys its Vulkan handle,
/// but the destruction order across fields matters, so [`Drop`] waits for
/// the device to go idle and then releases the fields explicitly in
/// reverse acquisition order. `ManuallyDrop` keeps the compiler's
/// field-order drops out of the way.
pub struct Renderer {
    // Fields in acquisition order; Drop releases them back to front.
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    swapchain: ManuallyDrop<Swapchain>,
    render_pass: ManuallyDrop<RenderPass>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline: ManuallyDrop<Pipeline>,
    command_pool: ManuallyDrop<CommandPool>,
    targets: ManuallyDrop<RenderTargets>,
    texture: ManuallyDrop<Texture>,
    mesh: ManuallyDrop<MeshBuffers>,
    frames: ManuallyDrop<FrameSlots>,

    /// Probed once; swapchain recreation reuses it.
    depth_format: vk::Format,
    /// Animation clock, started at construction.
    timer: Timer,
    /// Set by [`handle_resize`], consumed after present.
    ///
    /// [`handle_resize`]: Renderer::handle_resize
    framebuffer_resized: bool,
    /// Last reported framebuffer width. Zero while minimized.
    width: u32,
    /// Last reported framebuffer height. Zero while minimized.
    height: u32,
}

impl Renderer {
    /// Creates a renderer bound to `window`.
    ///
    /// Brings up the whole Vulkan stack, uploads the model and texture and
    /// prepares the per-frame slots. The animation clock starts here.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan stack cannot be initialized or an
    /// asset fails to load; every error from here is fatal.
    pub fn new(window: &Window) -> Result<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing renderer ({}x{})", width, height);

        let display_handle = window
            .display_handle()
            .map_err(|e| Error::Window(format!("display handle unavailable: {}", e)))?;
        let extensions = required_extensions(display_handle.as_raw())?;

        let instance = Instance::new(&extensions, cfg!(debug_assertions)).map_err(render_err)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())
                .map_err(render_err)?;
        let msaa_samples = physical_device.max_usable_sample_count();
        let depth_format =
            targets::find_depth_format(instance.handle(), &physical_device).map_err(render_err)?;

        let device = Device::new(&instance, &physical_device).map_err(render_err)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)
            .map_err(render_err)?;

        let render_pass =
            RenderPass::new(device.clone(), swapchain.format(), depth_format, msaa_samples)
                .map_err(render_err)?;

        let descriptor_set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[
                bindings::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
                bindings::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
            ],
        )
        .map_err(render_err)?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(MAX_FRAMES_IN_FLIGHT as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(MAX_FRAMES_IN_FLIGHT as u32),
        ];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), MAX_FRAMES_IN_FLIGHT as u32, &pool_sizes)
                .map_err(render_err)?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])
            .map_err(render_err)?;
        let pipeline =
            Self::create_pipeline(&device, &pipeline_layout, &render_pass).map_err(render_err)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)
            .map_err(render_err)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family).map_err(render_err)?;

        let render_targets = RenderTargets::new(
            device.clone(),
            instance.handle(),
            &command_pool,
            &render_pass,
            &swapchain,
            depth_format,
        )
        .map_err(render_err)?;

        let texture_data = TextureData::load(Path::new(TEXTURE_PATH)).map_err(asset_err)?;
        let texture = Texture::from_rgba8(
            device.clone(),
            instance.handle(),
            &command_pool,
            texture_data.width,
            texture_data.height,
            &texture_data.pixels,
        )
        .map_err(render_err)?;

        let mesh_data = MeshData::load(Path::new(MODEL_PATH)).map_err(asset_err)?;
        let mesh =
            MeshBuffers::upload(device.clone(), &command_pool, &mesh_data).map_err(render_err)?;

        let set_layouts = vec![descriptor_set_layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let descriptor_sets = descriptor_pool.allocate(&set_layouts).map_err(render_err)?;
        let frames =
            FrameSlots::new(device.clone(), &command_pool, descriptor_sets).map_err(render_err)?;
        Self::write_frame_descriptors(&device, &frames, &texture);

        info!(
            "Renderer ready: {} swapchain images, {:?} samples, {} texture mips, {} indices",
            swapchain.image_count(),
            msaa_samples,
            texture.mip_levels(),
            mesh.index_count()
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            command_pool: ManuallyDrop::new(command_pool),
            targets: ManuallyDrop::new(render_targets),
            texture: ManuallyDrop::new(texture),
            mesh: ManuallyDrop::new(mesh),
            frames: ManuallyDrop::new(frames),
            depth_format,
            timer: Timer::new(),
            framebuffer_resized: false,
            width,
            height,
        })
    }

    /// Builds the one graphics pipeline the renderer uses.
    fn create_pipeline(
        device: &Arc<Device>,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new(VERT_SHADER_PATH),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new(FRAG_SHADER_PATH),
            ShaderStage::Fragment,
            "main",
        )?;

        let mut builder = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(MeshVertex::binding_description())
            .vertex_attributes(&MeshVertex::attribute_descriptions())
            .samples(render_pass.samples());
        if render_pass.is_multisampled() {
            builder = builder.sample_shading(MIN_SAMPLE_SHADING);
        }

        builder.build(device.clone(), layout, render_pass)
    }

    /// Points each slot's descriptor set at its uniform buffer and the
    /// shared texture.
    fn write_frame_descriptors(device: &Device, frames: &FrameSlots, texture: &Texture) {
        for slot in frames.iter() {
            let uniform_infos = [buffer_info(
                slot.uniform().handle(),
                0,
                UniformBufferObject::SIZE as vk::DeviceSize,
            )];
            let sampler_infos = [image_info(
                texture.sampler(),
                texture.view(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(slot.descriptor_set())
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&uniform_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(slot.descriptor_set())
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&sampler_infos),
            ];
            update_descriptor_sets(device, &writes);
        }
    }

    /// Records a new framebuffer size; the swapchain is rebuilt on the
    /// next frame.
    ///
    /// A zero dimension means the window is minimized; frames are skipped
    /// until it becomes visible again.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }

        debug!(
            "Resize: {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        self.framebuffer_resized = true;
    }

    /// Renders and presents one frame.
    ///
    /// Swapchain staleness (resize, out-of-date, suboptimal) is absorbed by
    /// rebuilding; an error from here means the GPU or the window system is
    /// in a state the renderer cannot recover from.
    pub fn draw_frame(&mut self) -> Result<()> {
        self.render_frame().map_err(render_err)
    }

    fn render_frame(&mut self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            // Minimized; nothing to present.
            return Ok(());
        }

        self.frames.current().sync().fence().wait(u64::MAX)?;

        let image_available = self.frames.current().sync().image_available();
        let image_index = match self.swapchain.acquire_next_image(image_available)? {
            AcquiredImage::Ready { index, suboptimal } => {
                if suboptimal {
                    debug!("Acquired suboptimal swapchain image, presenting anyway");
                }
                index
            }
            AcquiredImage::OutOfDate => {
                debug!("Swapchain out of date on acquire, rebuilding");
                // The fence stays signaled, so the next attempt won't block.
                self.recreate_swapchain()?;
                return Ok(());
            }
        };

        self.frames.current().sync().fence().reset()?;

        self.record_commands(image_index)?;
        self.update_uniforms()?;

        let slot = self.frames.current();
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer().handle()];
        let signal_semaphores = [slot.sync().render_finished()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.sync().fence().handle())?;
        }

        let needs_rebuild = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            slot.sync().render_finished(),
        )?;

        if needs_rebuild || self.framebuffer_resized {
            debug!("Swapchain stale after present, rebuilding");
            self.framebuffer_resized = false;
            self.recreate_swapchain()?;
        }

        self.frames.advance();

        Ok(())
    }

    /// Writes this frame's matrices into the current slot's mapped uniform
    /// buffer.
    fn update_uniforms(&self) -> RhiResult<()> {
        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        let ubo = UniformBufferObject::for_elapsed(self.timer.elapsed_secs(), aspect);

        self.frames
            .current()
            .uniform()
            .write_data(0, bytemuck::bytes_of(&ubo))
    }

    /// Re-records the current slot's command buffer for `image_index`.
    fn record_commands(&self, image_index: u32) -> RhiResult<()> {
        let slot = self.frames.current();
        let cmd = slot.command_buffer();
        let extent = self.swapchain.extent();

        cmd.reset()?;
        cmd.begin()?;

        // One entry per attachment, indices matching the render pass; the
        // resolve attachment's entry exists but is never read.
        let mut clear_values = vec![
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        if self.render_pass.is_multisampled() {
            clear_values.push(vk::ClearValue::default());
        }

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.targets.framebuffer(image_index as usize))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

        // Viewport and scissor are dynamic pipeline state.
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        cmd.set_viewport(&viewport);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        cmd.set_scissor(&scissor);

        cmd.bind_vertex_buffers(0, &[self.mesh.vertex_buffer().handle()], &[0]);
        cmd.bind_index_buffer(self.mesh.index_buffer().handle(), 0, vk::IndexType::UINT32);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &[slot.descriptor_set()],
            &[],
        );
        cmd.draw_indexed(self.mesh.index_count(), 1, 0, 0, 0);

        cmd.end_render_pass();
        cmd.end()
    }

    /// Rebuilds the swapchain and its dependent render targets.
    ///
    /// The render pass and pipeline survive a resize: the surface format
    /// does not change and viewport/scissor are dynamic state.
    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            debug!("Skipping swapchain rebuild while minimized");
            return Ok(());
        }

        self.device.wait_idle()?;

        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.width, self.height)?;

        let render_targets = RenderTargets::new(
            Arc::clone(&self.device),
            self.instance.handle(),
            &self.command_pool,
            &self.render_pass,
            &self.swapchain,
            self.depth_format,
        )?;

        // Replace the old targets; the device is idle, nothing uses them.
        unsafe {
            ManuallyDrop::drop(&mut self.targets);
        }
        self.targets = ManuallyDrop::new(render_targets);

        info!("Swapchain rebuilt at {}x{}", self.width, self.height);

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle in renderer teardown: {}", e);
        }

        // Reverse acquisition order: everything holding a device reference
        // goes first, then the device, the surface, the instance.
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.mesh);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.targets);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
