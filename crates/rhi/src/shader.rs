//! Shader module management.
//!
//! Loads pre-compiled SPIR-V (the GLSL sources under `assets/shaders/` are
//! compiled out-of-band with `glslc`) and wraps VkShaderModule together
//! with the stage and entry point the pipeline needs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use aster_rhi::device::Device;
//! use aster_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), aster_rhi::RhiError> {
//! let vertex = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("assets/shaders/mesh.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let stage_info = vertex.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every valid SPIR-V binary.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Pipeline stage a shader module plugs into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// The corresponding `vk::ShaderStageFlags`.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reassembles a SPIR-V byte stream into code words.
///
/// Rejects blobs whose length is not a multiple of 4 or whose first word
/// is not the SPIR-V magic number; both indicate a file that was never a
/// compiled shader (or was truncated on the way in).
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RhiError::Shader(format!(
            "SPIR-V length must be a multiple of 4, got {} bytes",
            bytes.len()
        )));
    }

    let code: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match code.first() {
        Some(&word) if word == SPIRV_MAGIC => Ok(code),
        Some(&word) => Err(RhiError::Shader(format!(
            "bad SPIR-V magic number {:#010x}",
            word
        ))),
        None => Err(RhiError::Shader("empty SPIR-V blob".to_string())),
    }
}

/// Vulkan shader module wrapper.
///
/// Immutable after creation; destroyed on drop.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Creates a shader module from a SPIR-V file on disk.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, the blob is not valid SPIR-V,
    /// or module creation fails. A missing shader file is a setup error
    /// the renderer treats as fatal.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::Shader(format!("failed to read {:?}: {}", path, e)))?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a shader module from in-memory SPIR-V bytes.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::Shader(format!("invalid entry point name: {}", e)))?;

        debug!("Created {} shader module", stage);

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the shader stage.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage create info for pipeline creation. Borrows from `self`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn stage_maps_to_vk_flags() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn spirv_words_accepts_valid_header() {
        // Magic, version 1.0, generator, bound, schema.
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn spirv_words_rejects_misaligned_length() {
        let bytes = vec![0u8; 5];
        assert!(matches!(spirv_words(&bytes), Err(RhiError::Shader(_))));
    }

    #[test]
    fn spirv_words_rejects_bad_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 0, 0, 0]);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::Shader(_))));
    }

    #[test]
    fn spirv_words_rejects_empty_input() {
        assert!(matches!(spirv_words(&[]), Err(RhiError::Shader(_))));
    }

    #[test]
    fn spirv_words_are_little_endian() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x78, 0x56, 0x34, 0x12];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x1234_5678]);
    }
}
