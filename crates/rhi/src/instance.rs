//! Vulkan instance management.
//!
//! Handles VkInstance creation, the Khronos validation layer, and the debug
//! messenger that routes validation output into `tracing`.
//!
//! # Overview
//!
//! [`Instance::new`] takes the surface extension list enumerated by the
//! platform layer, so this module never guesses at per-OS extension names.
//! When validation is requested the layer must actually be installed;
//! running "validated" without validation would hide exactly the bugs the
//! request was meant to catch.

use std::ffi::CStr;

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation support.
///
/// Owns the entry point, the instance, and (when validation is on) the
/// debug messenger. Dropped last among the GPU objects; Drop destroys the
/// messenger before the instance.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a Vulkan 1.0 instance.
    ///
    /// # Arguments
    ///
    /// * `surface_extensions` - instance extensions required by the window
    ///   system, as returned by `aster_platform::required_extensions`
    /// * `enable_validation` - enable `VK_LAYER_KHRONOS_validation` plus the
    ///   debug messenger
    ///
    /// # Errors
    ///
    /// Fails if the Vulkan library cannot be loaded, if validation was
    /// requested but the layer is not installed, or if instance creation
    /// itself fails.
    pub fn new(surface_extensions: &[*const i8], enable_validation: bool) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        if enable_validation && !Self::validation_layer_available(&entry)? {
            return Err(RhiError::Instance(
                "validation layers requested but VK_LAYER_KHRONOS_validation is not installed"
                    .to_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"aster")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"aster")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = surface_extensions.to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!("Vulkan instance created (API 1.0)");

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::create_debug_messenger(&debug_utils)?;
            debug!("Debug messenger installed");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether the validation layer is active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let wanted = VALIDATION_LAYER_NAME.to_bytes_with_nul();
        let found = available_layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_bytes_with_nul() == wanted
        });

        Ok(found)
    }

    fn create_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            // Messenger first, it belongs to the instance.
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Validation-layer callback. Logs through `tracing` and always lets the
/// triggering call continue.
///
/// # Safety
///
/// Called by the driver with the pointers the Vulkan spec promises for
/// debug callbacks.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "general",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[vk {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[vk {}] {}", type_str, message);
        }
        _ => {
            debug!("[vk {}] {}", type_str, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_without_validation() {
        // Requires a Vulkan loader and driver on the machine.
        match Instance::new(&[], false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::Loading(_)) | Err(RhiError::Vulkan(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    #[test]
    fn missing_validation_layer_is_fatal() {
        // Either the layer exists (instance comes up validated) or the
        // request must fail loudly; silently dropping validation is not ok.
        match Instance::new(&[], true) {
            Ok(instance) => assert!(instance.has_validation()),
            Err(RhiError::Instance(msg)) => {
                assert!(msg.contains("validation"));
            }
            Err(RhiError::Loading(_)) | Err(RhiError::Vulkan(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
}
