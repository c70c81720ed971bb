//! Vulkan device bootstrap. The instance and the logical device are created
//! through the OpenXR runtime so the runtime can add what it needs for
//! direct output; the window surface is created alongside so the same
//! device presents to the desktop.

mod clear;
mod swapchain;
mod target;

pub use clear::{clear_value, ClearPass};
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, Presented,
    WindowSwapchain,
};
pub use target::RenderTargets;

use std::ffi::{CStr, CString};

use anyhow::Result;
use ash::extensions::khr;
use ash::vk::{self, Handle};
use log::{debug, info, warn};

use crate::config::APPLICATION_NAME;
use crate::vr::RenderingShim;
use crate::window::WindowShell;

/// Vulkan version requested from the runtime.
pub const VULKAN_API_VERSION: u32 = vk::API_VERSION_1_1;

/// Instance-level handles: the instance itself and the window surface.
struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl VulkanInstance {
    fn new(shim: &RenderingShim, window: &WindowShell) -> Result<Self> {
        let entry = ash::Entry::linked();

        // The window system's surface extensions; the runtime appends its own
        let extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .map_err(|err| anyhow::anyhow!("Failed to query window surface extensions: {}", err))?;

        let app_name = CString::new(APPLICATION_NAME)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(VULKAN_API_VERSION);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(extensions);

        debug!("Creating Vulkan instance through OpenXR...");
        let instance = unsafe {
            let raw_instance = shim
                .instance()
                .create_vulkan_instance(
                    shim.system(),
                    std::mem::transmute(entry.static_fn().get_instance_proc_addr),
                    &*create_info as *const _ as *const _,
                )
                .map_err(|err| anyhow::anyhow!("Failed to create Vulkan instance: {}", err))?
                .map_err(|raw| anyhow::anyhow!("Vulkan error creating instance: {}", vk::Result::from_raw(raw)))?;
            ash::Instance::load(entry.static_fn(), vk::Instance::from_raw(raw_instance as _))
        };

        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        };
        let surface = match surface {
            Ok(surface) => surface,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(anyhow::anyhow!("Failed to create window surface: {}", err));
            }
        };
        let surface_loader = khr::Surface::new(&entry, &instance);

        Ok(Self {
            entry,
            instance,
            surface_loader,
            surface,
        })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        info!("Cleaning up Vulkan instance");
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

struct VulkanDevice {
    device: ash::Device,
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        info!("Cleaning up Vulkan device");
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("Device wait before device cleanup failed: {}", err);
            }
            self.device.destroy_device(None);
        }
    }
}

/// Adapter, device and queue shared by the window swap chain and the headset.
pub struct GraphicsContext {
    // Declared before the instance so the device is destroyed first.
    device: VulkanDevice,
    instance: VulkanInstance,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    queue_family_index: u32,
}

impl GraphicsContext {
    pub fn new(shim: &RenderingShim, window: &WindowShell) -> Result<Self> {
        let instance = VulkanInstance::new(shim, window)?;

        // The runtime decides which adapter drives the headset
        let physical_device = unsafe {
            let raw = shim
                .instance()
                .vulkan_graphics_device(shim.system(), instance.instance.handle().as_raw() as _)
                .map_err(|err| anyhow::anyhow!("Failed to get Vulkan physical device: {}", err))?;
            vk::PhysicalDevice::from_raw(raw as _)
        };

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        info!(
            "Selected Vulkan device: {} (type: {:?}, API version: {}.{}.{})",
            device_name.to_string_lossy(),
            properties.device_type,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
        );
        if properties.api_version < VULKAN_API_VERSION {
            anyhow::bail!(
                "Vulkan device supports {}.{}, need 1.1",
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
            );
        }

        let families = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };
        let queue_family_index = select_queue_family(&families, |index| {
            unsafe {
                instance
                    .surface_loader
                    .get_physical_device_surface_support(physical_device, index, instance.surface)
            }
            .map_err(|err| anyhow::anyhow!("Failed to query surface support for queue family {}: {}", index, err))
        })?
        .ok_or_else(|| anyhow::anyhow!("No queue family supports both graphics and presentation"))?;
        debug!("Selected queue family index: {}", queue_family_index);

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)
            .build()];
        let extensions = [khr::Swapchain::name().as_ptr()];
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions);

        debug!("Creating Vulkan device through OpenXR...");
        let device = unsafe {
            let raw_device = shim
                .instance()
                .create_vulkan_device(
                    shim.system(),
                    std::mem::transmute(instance.entry.static_fn().get_instance_proc_addr),
                    physical_device.as_raw() as _,
                    &*create_info as *const _ as *const _,
                )
                .map_err(|err| anyhow::anyhow!("Failed to create Vulkan device: {}", err))?
                .map_err(|raw| anyhow::anyhow!("Vulkan error creating device: {}", vk::Result::from_raw(raw)))?;
            ash::Device::load(instance.instance.fp_v1_0(), vk::Device::from_raw(raw_device as _))
        };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        info!("Vulkan device initialized successfully");

        Ok(Self {
            device: VulkanDevice { device },
            instance,
            physical_device,
            queue,
            queue_family_index,
        })
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.instance.surface
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.instance.surface_loader
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device().device_wait_idle() }
            .map_err(|err| anyhow::anyhow!("Failed to wait for device idle: {}", err))
    }
}

/// First queue family that can both render and present. A failed present
/// support query is an error, not a missing family.
pub fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool>,
) -> Result<Option<u32>> {
    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 || !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        let index = index as u32;
        if supports_present(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_needs_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 16),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(select_queue_family(&families, |_| Ok(true)).unwrap(), Some(1));
        assert_eq!(select_queue_family(&families, |index| Ok(index == 2)).unwrap(), Some(2));
        assert_eq!(select_queue_family(&families, |index| Ok(index == 0)).unwrap(), None);
    }

    #[test]
    fn test_queue_family_skips_empty_families() {
        let families = [family(vk::QueueFlags::GRAPHICS, 0), family(vk::QueueFlags::GRAPHICS, 1)];
        assert_eq!(select_queue_family(&families, |_| Ok(true)).unwrap(), Some(1));
    }

    #[test]
    fn test_no_queue_families() {
        assert_eq!(select_queue_family(&[], |_| Ok(true)).unwrap(), None);
    }

    #[test]
    fn test_present_support_failure_is_reported() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1), family(vk::QueueFlags::GRAPHICS, 1)];
        let err = select_queue_family(&families, |_| {
            Err(anyhow::anyhow!("{}", vk::Result::ERROR_SURFACE_LOST_KHR))
        })
        .unwrap_err();
        assert!(err.to_string().contains("ERROR_SURFACE_LOST_KHR"), "{}", err);
    }

    #[test]
    fn test_queries_stop_at_first_supported_family() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1), family(vk::QueueFlags::GRAPHICS, 1)];
        let mut queried = Vec::new();
        let selected = select_queue_family(&families, |index| {
            queried.push(index);
            Ok(true)
        })
        .unwrap();
        assert_eq!(selected, Some(0));
        assert_eq!(queried, [0]);
    }
}
