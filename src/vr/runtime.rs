use anyhow::Result;
use log::{debug, info};
use openxr as xr;

use super::RenderingShim;

pub const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;

/// What the runtime reports about the headset: its name, how each eye
/// wants to be rendered, and how frames are composited.
#[derive(Debug, Clone)]
pub struct Runtime {
    system_name: String,
    views: Vec<xr::ViewConfigurationView>,
    blend_mode: xr::EnvironmentBlendMode,
}

impl Runtime {
    pub fn initialize(shim: &RenderingShim) -> Result<Self> {
        let instance = shim.instance();
        let system = shim.system();

        let properties = instance
            .system_properties(system)
            .map_err(|err| anyhow::anyhow!("Failed to get system properties: {}", err))?;
        info!("Headset: {} (vendor {:#06x})", properties.system_name, properties.vendor_id);
        debug!("Tracking capabilities: {:?}", properties.tracking_properties);

        let view_types = instance
            .enumerate_view_configurations(system)
            .map_err(|err| anyhow::anyhow!("Failed to enumerate view configurations: {}", err))?;
        if !view_types.contains(&VIEW_TYPE) {
            return Err(anyhow::anyhow!("Headset does not support stereo views"));
        }

        let views = instance
            .enumerate_view_configuration_views(system, VIEW_TYPE)
            .map_err(|err| anyhow::anyhow!("Failed to get view configuration: {}", err))?;
        if views.len() != 2 {
            return Err(anyhow::anyhow!("Expected 2 stereo views, runtime reported {}", views.len()));
        }
        info!(
            "Recommended eye resolution: {}x{}",
            views[0].recommended_image_rect_width, views[0].recommended_image_rect_height
        );

        let blend_modes = instance
            .enumerate_environment_blend_modes(system, VIEW_TYPE)
            .map_err(|err| anyhow::anyhow!("Failed to get blend modes: {}", err))?;
        let blend_mode = choose_blend_mode(&blend_modes)
            .ok_or_else(|| anyhow::anyhow!("Runtime reports no environment blend modes"))?;
        debug!("Environment blend mode: {:?}", blend_mode);

        Ok(Self {
            system_name: properties.system_name,
            views,
            blend_mode,
        })
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    /// Per-eye size; both eyes share the first view's recommendation.
    pub fn eye_resolution(&self) -> (u32, u32) {
        let view = &self.views[0];
        (view.recommended_image_rect_width, view.recommended_image_rect_height)
    }

    pub fn blend_mode(&self) -> xr::EnvironmentBlendMode {
        self.blend_mode
    }
}

pub fn choose_blend_mode(modes: &[xr::EnvironmentBlendMode]) -> Option<xr::EnvironmentBlendMode> {
    if modes.contains(&xr::EnvironmentBlendMode::OPAQUE) {
        Some(xr::EnvironmentBlendMode::OPAQUE)
    } else {
        modes.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_prefers_opaque() {
        let modes = [xr::EnvironmentBlendMode::ADDITIVE, xr::EnvironmentBlendMode::OPAQUE];
        assert_eq!(choose_blend_mode(&modes), Some(xr::EnvironmentBlendMode::OPAQUE));
    }

    #[test]
    fn test_blend_mode_falls_back_to_first() {
        let modes = [xr::EnvironmentBlendMode::ALPHA_BLEND, xr::EnvironmentBlendMode::ADDITIVE];
        assert_eq!(choose_blend_mode(&modes), Some(xr::EnvironmentBlendMode::ALPHA_BLEND));
        assert_eq!(choose_blend_mode(&[]), None);
    }
}
