//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! Selection walks the enumerated devices in order and takes the first one
//! that passes every check:
//! 1. Required device extensions (swapchain)
//! 2. Queue family completeness (graphics + present)
//! 3. Swapchain adequacy (at least one surface format and present mode)
//! 4. Required feature bits (sampler anisotropy, geometry shaders)
//!
//! The selected [`PhysicalDeviceInfo`] also answers the capability queries
//! the rest of the RHI needs: memory-type lookup for manual allocation,
//! the usable MSAA sample count, and tiling-aware format support.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every selected GPU must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Highest MSAA count worth paying for; the ladder never picks above this
/// even when the hardware reports 16x or 64x support.
pub const MSAA_SAMPLE_CAP: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_8;

/// Queue family indices used by the renderer.
///
/// Graphics and presentation may or may not share a family; everything
/// downstream (queue creation, swapchain sharing mode) keys off that.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics commands.
    pub graphics_family: Option<u32>,
    /// Family able to present to the target surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True once both required families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// The distinct family indices, for logical-device queue creation.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family {
            if !families.contains(&present) {
                families.push(present);
            }
        }
        families
    }
}

/// Everything the rest of the RHI needs to know about the chosen GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types, for manual allocation.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices resolved against the target surface.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Human-readable device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Finds the first memory type compatible with an allocation.
    ///
    /// `type_bits` comes from `vk::MemoryRequirements::memory_type_bits`;
    /// a type qualifies when its bit is set there and its property flags
    /// contain everything in `required`. Lower indices win ties, matching
    /// how drivers order their preferred types.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let count = self.memory_properties.memory_type_count as usize;
        self.memory_properties.memory_types[..count]
            .iter()
            .enumerate()
            .find(|(i, memory_type)| {
                (type_bits & (1 << i)) != 0 && memory_type.property_flags.contains(required)
            })
            .map(|(i, _)| i as u32)
    }

    /// Highest MSAA sample count usable for both color and depth targets,
    /// clamped to [`MSAA_SAMPLE_CAP`].
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        let supported =
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        highest_sample_count(supported, MSAA_SAMPLE_CAP)
    }

    /// First format in `candidates` whose tiling-specific features contain
    /// `features`. Used to probe the depth attachment format.
    pub fn find_supported_format(
        &self,
        instance: &ash::Instance,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props =
                    unsafe { instance.get_physical_device_format_properties(self.device, format) };
                let supported = match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features,
                    _ => props.optimal_tiling_features,
                };
                supported.contains(features)
            })
            .ok_or_else(|| {
                RhiError::UnsupportedFormat(format!(
                    "none of {:?} supports {:?} with {:?} tiling",
                    candidates, features, tiling
                ))
            })
    }

    /// Whether `format` supports linear filtering for blit sources under
    /// optimal tiling. Mipmap generation refuses formats that do not.
    pub fn supports_linear_blit(&self, instance: &ash::Instance, format: vk::Format) -> bool {
        let props = unsafe { instance.get_physical_device_format_properties(self.device, format) };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Walks `supported` from 64x down to 2x and returns the first count that
/// is supported and does not exceed `cap`; 1x when nothing else fits.
pub fn highest_sample_count(
    supported: vk::SampleCountFlags,
    cap: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let ladder = [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ];

    ladder
        .into_iter()
        .find(|&count| supported.contains(count) && count.as_raw() <= cap.as_raw())
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Selects the first physical device that satisfies the renderer.
///
/// Devices are inspected in enumeration order; there is no ranking. A
/// device qualifies when it offers the required extensions, complete queue
/// families for the surface, an adequate swapchain, and the feature bits
/// the pipeline depends on.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when nothing qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    debug!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .find_map(|device| check_device_suitability(instance, device, surface, surface_loader));

    match selected {
        Some(info) => {
            let (major, minor, patch) = info.api_version();
            info!(
                "Selected GPU: '{}' ({}), Vulkan {}.{}.{}",
                info.device_name(),
                info.device_type_name(),
                major,
                minor,
                patch
            );
            Ok(info)
        }
        None => {
            warn!("No GPU passed the suitability checks");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    if !supports_required_extensions(instance, device) {
        debug!("GPU '{}' skipped: missing device extensions", device_name);
        return None;
    }

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    // Only meaningful to query once the swapchain extension is known present.
    let adequate = SwapchainSupportDetails::query(device, surface, surface_loader)
        .map(|support| support.is_adequate())
        .unwrap_or(false);
    if !adequate {
        debug!(
            "GPU '{}' skipped: no usable surface formats or present modes",
            device_name
        );
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: no sampler anisotropy", device_name);
        return None;
    }
    if features.geometry_shader == vk::FALSE {
        debug!("GPU '{}' skipped: no geometry shader support", device_name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

fn supports_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let available = match unsafe { instance.enumerate_device_extension_properties(device) } {
        Ok(extensions) => extensions,
        Err(_) => return false,
    };

    REQUIRED_DEVICE_EXTENSIONS.iter().all(|&required| {
        available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == required
        })
    })
}

/// Finds the graphics and present families for `device` against `surface`.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };
            if present_support {
                indices.present_family = Some(i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with_memory(types: &[(vk::MemoryPropertyFlags, u32)]) -> PhysicalDeviceInfo {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties::default();
        memory_properties.memory_type_count = types.len() as u32;
        for (i, &(flags, heap)) in types.iter().enumerate() {
            memory_properties.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: heap,
            };
        }
        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            properties: vk::PhysicalDeviceProperties::default(),
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties,
            queue_families: QueueFamilyIndices::default(),
        }
    }

    #[test]
    fn queue_families_incomplete_by_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
    }

    #[test]
    fn queue_families_complete_when_both_present() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn unique_families_collapse_shared_index() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![2]);
    }

    #[test]
    fn find_memory_type_requires_bit_and_properties() {
        let info = info_with_memory(&[
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1,
            ),
        ]);

        // Type bits admit both, properties narrow it to the host type.
        let index = info.find_memory_type(
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Some(1));

        // Type bits exclude index 0 even though its properties would match.
        let index = info.find_memory_type(0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(index, None);
    }

    #[test]
    fn find_memory_type_prefers_lowest_index() {
        let info = info_with_memory(&[
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
        ]);
        let index = info.find_memory_type(0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(index, Some(0));
    }

    #[test]
    fn find_memory_type_superset_properties_qualify() {
        // A type with more properties than requested still matches.
        let info = info_with_memory(&[(
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
            0,
        )]);
        let index = info.find_memory_type(0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(index, Some(0));
    }

    #[test]
    fn sample_ladder_picks_highest_supported() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(
            highest_sample_count(supported, MSAA_SAMPLE_CAP),
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    fn sample_ladder_respects_cap() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8
            | vk::SampleCountFlags::TYPE_16
            | vk::SampleCountFlags::TYPE_64;
        assert_eq!(
            highest_sample_count(supported, MSAA_SAMPLE_CAP),
            vk::SampleCountFlags::TYPE_8
        );
    }

    #[test]
    fn sample_ladder_falls_back_to_single_sample() {
        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::TYPE_1, MSAA_SAMPLE_CAP),
            vk::SampleCountFlags::TYPE_1
        );
        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::empty(), MSAA_SAMPLE_CAP),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
