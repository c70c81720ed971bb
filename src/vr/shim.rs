use anyhow::Result;
use log::{debug, info};
use openxr as xr;

use crate::config::APPLICATION_NAME;

/// Vulkan version the graphics device is created with.
pub const TARGET_VULKAN_VERSION: xr::Version = xr::Version::new(1, 1, 0);

/// The loaded OpenXR runtime and its head-mounted system, checked against the
/// graphics requirements it imposes. This has to exist before the graphics device is
/// created: the device is created through it, and the runtime refuses to do
/// that until its requirements have been queried.
pub struct RenderingShim {
    instance: xr::Instance,
    system: xr::SystemId,
}

impl RenderingShim {
    pub fn initialize() -> Result<Self> {
        let entry = xr::Entry::linked();

        let available_extensions = entry
            .enumerate_extensions()
            .map_err(|err| anyhow::anyhow!("Failed to enumerate OpenXR extensions: {}", err))?;
        debug!("Available OpenXR extensions: {:?}", available_extensions);

        if !available_extensions.khr_vulkan_enable2 {
            return Err(anyhow::anyhow!("OpenXR Vulkan support not available"));
        }
        let mut enabled_extensions = xr::ExtensionSet::default();
        enabled_extensions.khr_vulkan_enable2 = true;

        let app_info = xr::ApplicationInfo {
            application_name: APPLICATION_NAME,
            application_version: 1,
            engine_name: APPLICATION_NAME,
            engine_version: 1,
        };
        let instance = entry
            .create_instance(&app_info, &enabled_extensions, &[])
            .map_err(|err| anyhow::anyhow!("Failed to create OpenXR instance: {}", err))?;

        let properties = instance
            .properties()
            .map_err(|err| anyhow::anyhow!("Failed to query OpenXR runtime: {}", err))?;
        info!(
            "Loaded OpenXR runtime: {} {}",
            properties.runtime_name, properties.runtime_version
        );

        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .map_err(|err| anyhow::anyhow!("Failed to get system ID: {}", err))?;

        // Must be queried before any Vulkan object is created through the runtime
        let requirements = instance
            .graphics_requirements::<xr::Vulkan>(system)
            .map_err(|err| anyhow::anyhow!("Failed to get Vulkan requirements: {}", err))?;
        debug!(
            "Runtime supports Vulkan {} to {}",
            requirements.min_api_version_supported, requirements.max_api_version_supported
        );

        if !vulkan_version_supported(TARGET_VULKAN_VERSION, &requirements) {
            return Err(anyhow::anyhow!(
                "OpenXR runtime requires Vulkan {} to {}, this build targets {}",
                requirements.min_api_version_supported,
                requirements.max_api_version_supported,
                TARGET_VULKAN_VERSION
            ));
        }

        Ok(Self { instance, system })
    }

    pub fn instance(&self) -> &xr::Instance {
        &self.instance
    }

    pub fn system(&self) -> xr::SystemId {
        self.system
    }
}

impl Drop for RenderingShim {
    fn drop(&mut self) {
        info!("Cleaning up OpenXR instance");
    }
}

/// Runtimes accept any version at or above their minimum within the
/// maximum's major version.
pub fn vulkan_version_supported(target: xr::Version, requirements: &xr::vulkan::Requirements) -> bool {
    target >= requirements.min_api_version_supported
        && target.major() <= requirements.max_api_version_supported.major()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn requirements(min: xr::Version, max: xr::Version) -> xr::vulkan::Requirements {
        xr::vulkan::Requirements {
            min_api_version_supported: min,
            max_api_version_supported: max,
        }
    }

    #[test]
    fn test_target_within_range() {
        let reqs = requirements(xr::Version::new(1, 0, 0), xr::Version::new(1, 3, 0));
        assert!(vulkan_version_supported(TARGET_VULKAN_VERSION, &reqs));
    }

    #[test]
    fn test_newer_minor_than_max_is_accepted() {
        let reqs = requirements(xr::Version::new(1, 0, 0), xr::Version::new(1, 0, 0));
        assert!(vulkan_version_supported(TARGET_VULKAN_VERSION, &reqs));
    }

    #[test]
    fn test_below_minimum_is_rejected() {
        let reqs = requirements(xr::Version::new(1, 2, 0), xr::Version::new(1, 3, 0));
        assert!(!vulkan_version_supported(TARGET_VULKAN_VERSION, &reqs));
    }

    #[test]
    fn test_newer_major_is_rejected() {
        let reqs = requirements(xr::Version::new(1, 0, 0), xr::Version::new(1, 3, 0));
        assert!(!vulkan_version_supported(xr::Version::new(2, 0, 0), &reqs));
    }

    #[test]
    #[serial]
    #[ignore = "needs an OpenXR runtime with a headset attached"]
    fn test_shim_initializes_with_runtime() {
        let shim = RenderingShim::initialize().unwrap();
        let requirements = shim
            .instance()
            .graphics_requirements::<xr::Vulkan>(shim.system())
            .unwrap();
        assert!(vulkan_version_supported(TARGET_VULKAN_VERSION, &requirements));
    }
}
