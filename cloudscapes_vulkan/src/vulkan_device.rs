//! VulkanDevice - logical device, graphics queue and memory-type resolver
//!
//! Shared by the buffer helpers and the GPU allocator. The device is destroyed
//! when the last `DeviceContext` reference goes away, so a GPU allocator
//! created from a device keeps that device alive.

use cloudscapes_core::{Config, Result};
use cloudscapes_core::{cloud_debug, cloud_err, cloud_info};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SOURCE: &str = "cloudscapes::vulkan";

/// Vulkan objects shared (via `Arc`) by the device handle and the GPU allocator
pub(crate) struct DeviceContext {
    /// Vulkan loader, kept alive for the instance
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) device: ash::Device,
    /// Graphics queue (vkQueueSubmit needs external synchronization)
    graphics_queue: Mutex<vk::Queue>,
    pub(crate) graphics_queue_family: u32,
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Raw `vkAllocateMemory` allocations not yet freed
    live_device_memory: AtomicUsize,
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            release_debug_messenger(&self.debug_utils_loader, &self.debug_messenger);

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Destroy a device's debug messenger, if it has one
fn release_debug_messenger(
    loader: &Option<ash::ext::debug_utils::Instance>,
    messenger: &Option<vk::DebugUtilsMessengerEXT>,
) {
    if let (Some(loader), Some(messenger)) = (loader, messenger) {
        #[cfg(feature = "vulkan-validation")]
        crate::vulkan_debug::unregister_messenger();

        unsafe {
            loader.destroy_debug_utils_messenger(*messenger, None);
        }
    }
}

/// Raise, on the calling thread, a validation error recorded in strict mode
pub(crate) fn raise_strict_validation_failure() {
    #[cfg(feature = "vulkan-validation")]
    crate::vulkan_debug::raise_strict_validation_failure();
}

/// Logical device handle used by every buffer transfer operation
///
/// Cheap to clone; clones share the same underlying device.
#[derive(Clone)]
pub struct VulkanDevice {
    pub(crate) ctx: Arc<DeviceContext>,
}

/// Return the lowest memory type index allowed by `type_bits` whose property
/// flags contain all of `properties`
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1u32 << index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index as u32)
}

/// Window-system handles for a surface-compatible device
struct SurfaceTarget {
    display: RawDisplayHandle,
    window: RawWindowHandle,
}

impl VulkanDevice {
    /// Create a device without any window-system integration
    ///
    /// Picks the first physical device exposing a graphics queue family.
    pub fn headless(config: &Config) -> Result<Self> {
        Self::create(config, None)
    }

    /// Create a device able to present to `window`
    ///
    /// The graphics queue family is required to support presentation to the
    /// window's surface and the swapchain extension is enabled.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        let display = window.display_handle()
            .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to get display handle: {}", e))?
            .as_raw();
        let window = window.window_handle()
            .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to get window handle: {}", e))?
            .as_raw();

        Self::create(config, Some(SurfaceTarget { display, window }))
    }

    fn create(config: &Config, target: Option<SurfaceTarget>) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to load Vulkan library: {:?}", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Invalid application name: {}", e))?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"CloudScapes")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let validation = config.enable_validation && cfg!(feature = "vulkan-validation");

            let mut extension_names = match &target {
                Some(target) => ash_window::enumerate_required_extensions(target.display)
                    .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to get required extensions: {}", e))?
                    .to_vec(),
                None => Vec::new(),
            };

            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to create Vulkan instance: {:?}", e))?;

            // Instance-level objects are destroyed by hand until DeviceContext owns them
            let (debug_utils_loader, debug_messenger) = if validation {
                match Self::create_debug_messenger(&entry, &instance, config) {
                    Ok((loader, messenger)) => (Some(loader), Some(messenger)),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                (None, None)
            };

            let destroy_instance = |instance: &ash::Instance| {
                release_debug_messenger(&debug_utils_loader, &debug_messenger);
                instance.destroy_instance(None);
            };

            let selected = Self::select_physical_device(&entry, &instance, target.as_ref());
            let (physical_device, graphics_queue_family) = match selected {
                Ok(selected) => selected,
                Err(e) => {
                    destroy_instance(&instance);
                    return Err(e);
                }
            };

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .queue_priorities(&queue_priorities)];

            let device_extension_names = if target.is_some() {
                vec![ash::khr::swapchain::NAME.as_ptr()]
            } else {
                vec![]
            };

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    destroy_instance(&instance);
                    return Err(cloud_err!(InitializationFailed, SOURCE, "Failed to create logical device: {:?}", e));
                }
            };

            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);
            let memory_properties = instance.get_physical_device_memory_properties(physical_device);

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());
            cloud_info!(SOURCE, "Using GPU '{}' (graphics queue family {}, {} memory types)",
                device_name, graphics_queue_family, memory_properties.memory_type_count);

            Ok(Self {
                ctx: Arc::new(DeviceContext {
                    _entry: entry,
                    instance,
                    physical_device,
                    memory_properties,
                    device,
                    graphics_queue: Mutex::new(graphics_queue),
                    graphics_queue_family,
                    debug_utils_loader,
                    debug_messenger,
                    live_device_memory: AtomicUsize::new(0),
                }),
            })
        }
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
        _config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        Err(cloud_err!(InitializationFailed, SOURCE, "Validation support is not compiled in"))
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        use cloudscapes_core::DebugSeverity;

        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let severity_flags = match config.debug_severity {
            DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            DebugSeverity::ErrorsAndWarnings => {
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            }
            DebugSeverity::All => {
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            }
        };

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity_flags)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));

        crate::vulkan_debug::register_messenger(crate::vulkan_debug::DebugConfig::from_config(config));

        match debug_utils.create_debug_utils_messenger(&debug_info, None) {
            Ok(messenger) => Ok((debug_utils, messenger)),
            Err(e) => {
                crate::vulkan_debug::unregister_messenger();
                Err(cloud_err!(InitializationFailed, SOURCE, "Failed to create debug messenger: {:?}", e))
            }
        }
    }

    /// First physical device with a graphics queue family (that can present to
    /// the target surface, if any)
    unsafe fn select_physical_device(
        entry: &ash::Entry,
        instance: &ash::Instance,
        target: Option<&SurfaceTarget>,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let surface = match target {
            Some(target) => Some(
                ash_window::create_surface(entry, instance, target.display, target.window, None)
                    .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to create surface: {:?}", e))?,
            ),
            None => None,
        };
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        let selected = instance
            .enumerate_physical_devices()
            .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to enumerate physical devices: {:?}", e))
            .and_then(|physical_devices| {
                if physical_devices.is_empty() {
                    return Err(cloud_err!(InitializationFailed, SOURCE, "No Vulkan-capable GPU found"));
                }

                physical_devices
                    .into_iter()
                    .find_map(|physical_device| {
                        instance
                            .get_physical_device_queue_family_properties(physical_device)
                            .iter()
                            .enumerate()
                            .find(|(index, family)| {
                                let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                                let present = match surface {
                                    Some(surface) => surface_loader
                                        .get_physical_device_surface_support(physical_device, *index as u32, surface)
                                        .unwrap_or(false),
                                    None => true,
                                };
                                graphics && present
                            })
                            .map(|(index, _)| (physical_device, index as u32))
                    })
                    .ok_or_else(|| cloud_err!(InitializationFailed, SOURCE, "No graphics queue family found"))
            });

        // The surface only serves queue selection
        if let Some(surface) = surface {
            surface_loader.destroy_surface(surface, None);
        }

        selected
    }

    /// Raw logical device
    pub fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    /// Instance the device was created from
    pub fn instance(&self) -> &ash::Instance {
        &self.ctx.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.ctx.physical_device
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.ctx.memory_properties
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.ctx.graphics_queue_family
    }

    /// Graphics queue handle
    ///
    /// Submissions from this crate go through an internal lock; callers
    /// submitting on their own must not race with a running upload.
    pub fn graphics_queue(&self) -> vk::Queue {
        match self.ctx.graphics_queue.lock() {
            Ok(queue) => *queue,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Number of raw device memory allocations (from `create_device_memory`,
    /// `create_buffer` and staging uploads) not yet freed
    pub fn live_device_memory(&self) -> usize {
        self.ctx.live_device_memory.load(Ordering::SeqCst)
    }

    pub(crate) fn track_memory_allocated(&self) {
        self.ctx.live_device_memory.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn track_memory_freed(&self) {
        self.ctx.live_device_memory.fetch_sub(1, Ordering::SeqCst);
    }

    /// Resolve a memory type index for a requirement bitmask and property flags
    ///
    /// # Errors
    ///
    /// `ResourceCreationError` if no memory type satisfies both.
    pub fn memory_type_index(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type_index(&self.ctx.memory_properties, type_bits, properties).ok_or_else(|| {
            cloud_err!(ResourceCreationError, SOURCE,
                "No memory type matches bits {:#b} with properties {:?}", type_bits, properties)
        })
    }

    /// Submit to the graphics queue
    pub(crate) fn submit(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> Result<()> {
        let queue = self.ctx.graphics_queue.lock()
            .map_err(|_| cloud_err!(BackendError, SOURCE, "Graphics queue lock poisoned"))?;
        unsafe {
            self.ctx.device.queue_submit(*queue, submits, fence)
                .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to submit commands to graphics queue: {:?}", e))
        }
    }

    /// Create a command pool for one-shot uploads on the graphics queue family
    /// (TRANSIENT + RESET_COMMAND_BUFFER)
    pub fn create_upload_command_pool(&self) -> Result<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.ctx.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe {
            self.ctx.device.create_command_pool(&create_info, None)
                .map_err(|e| cloud_err!(ResourceCreationError, SOURCE, "Failed to create upload command pool: {:?}", e))?
        };
        cloud_debug!(SOURCE, "Created upload command pool {:?}", pool);
        Ok(pool)
    }

    /// Destroy a command pool and every command buffer allocated from it
    pub fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe {
            self.ctx.device.destroy_command_pool(pool, None);
        }
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device.device_wait_idle()
                .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to wait idle: {:?}", e))
        }
    }
}

#[cfg(test)]
#[path = "vulkan_device_tests.rs"]
mod tests;
