use anyhow::Result;
use ash::vk::{self, Handle};
use log::{debug, info, trace, warn};
use openxr as xr;

use super::{Runtime, RenderingShim, TrackingPolicy, TrackingState, VIEW_TYPE};
use crate::graphics::{ClearPass, GraphicsContext, RenderTargets};
use crate::window::WindowShell;

/// What a session state change asks of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Begin,
    End,
    Quit,
    None,
}

pub fn session_action(state: xr::SessionState) -> SessionAction {
    match state {
        xr::SessionState::READY => SessionAction::Begin,
        xr::SessionState::STOPPING => SessionAction::End,
        xr::SessionState::EXITING | xr::SessionState::LOSS_PENDING => SessionAction::Quit,
        _ => SessionAction::None,
    }
}

/// Swapchain formats in order of preference.
const HEADSET_FORMATS: [vk::Format; 4] = [
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::B8G8R8A8_UNORM,
];

pub fn choose_headset_format(supported: &[u32]) -> Option<vk::Format> {
    HEADSET_FORMATS
        .iter()
        .copied()
        .find(|format| supported.contains(&(format.as_raw() as u32)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// The session is not running yet (or any more).
    Idle,
    /// The runtime asked for an empty frame.
    Skipped,
    Rendered(Option<TrackingState>),
}

/// The headset's image chain, created when the session is attached. Both
/// eyes share one image, left half and right half.
struct HeadsetOutput {
    // Views and framebuffers go before the images they reference
    targets: RenderTargets,
    clear: ClearPass,
    swapchain: xr::Swapchain<xr::Vulkan>,
    eye_width: i32,
    eye_height: i32,
}

pub struct HeadsetSession {
    output: Option<HeadsetOutput>,
    view_space: xr::Space,
    local_space: xr::Space,
    frame_stream: xr::FrameStream<xr::Vulkan>,
    frame_waiter: xr::FrameWaiter,
    session: xr::Session<xr::Vulkan>,
    event_storage: xr::EventDataBuffer,
    blend_mode: xr::EnvironmentBlendMode,
    eye_resolution: (u32, u32),
    tracking: TrackingPolicy,
    tracking_queries: u64,
    running: bool,
}

impl HeadsetSession {
    pub fn create(
        shim: &RenderingShim,
        runtime: &Runtime,
        gpu: &GraphicsContext,
        tracking: TrackingPolicy,
    ) -> Result<Self> {
        info!("Creating OpenXR session on {}...", runtime.system_name());
        let (session, frame_waiter, frame_stream) = unsafe {
            shim.instance()
                .create_session::<xr::Vulkan>(
                    shim.system(),
                    &xr::vulkan::SessionCreateInfo {
                        instance: gpu.instance().handle().as_raw() as _,
                        physical_device: gpu.physical_device().as_raw() as _,
                        device: gpu.device().handle().as_raw() as _,
                        queue_family_index: gpu.queue_family_index(),
                        queue_index: 0,
                    },
                )
                .map_err(|err| anyhow::anyhow!("Failed to create session: {}", err))?
        };

        let local_space = session
            .create_reference_space(xr::ReferenceSpaceType::LOCAL, xr::Posef::IDENTITY)
            .map_err(|err| anyhow::anyhow!("Failed to create local space: {}", err))?;
        let view_space = session
            .create_reference_space(xr::ReferenceSpaceType::VIEW, xr::Posef::IDENTITY)
            .map_err(|err| anyhow::anyhow!("Failed to create view space: {}", err))?;

        Ok(Self {
            output: None,
            view_space,
            local_space,
            frame_stream,
            frame_waiter,
            session,
            event_storage: xr::EventDataBuffer::new(),
            blend_mode: runtime.blend_mode(),
            eye_resolution: runtime.eye_resolution(),
            tracking,
            tracking_queries: 0,
            running: false,
        })
    }

    /// Binds the session's output: the headset swapchain and its render
    /// targets on the same device that presents to `window`.
    pub fn attach(&mut self, gpu: &GraphicsContext, window: &WindowShell) -> Result<()> {
        if self.output.is_some() {
            return Err(anyhow::anyhow!("Session is already attached"));
        }

        let formats = self
            .session
            .enumerate_swapchain_formats()
            .map_err(|err| anyhow::anyhow!("Failed to get swapchain formats: {}", err))?;
        let format = choose_headset_format(&formats)
            .ok_or_else(|| anyhow::anyhow!("No supported headset swapchain format in {:?}", formats))?;

        let (eye_width, eye_height) = self.eye_resolution;
        let extent = vk::Extent2D {
            width: eye_width * 2,
            height: eye_height,
        };
        let swapchain = self
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT,
                format: format.as_raw() as u32,
                sample_count: 1,
                width: extent.width,
                height: extent.height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .map_err(|err| anyhow::anyhow!("Failed to create headset swapchain: {}", err))?;

        let images = swapchain
            .enumerate_images()
            .map_err(|err| anyhow::anyhow!("Failed to enumerate headset images: {}", err))?
            .into_iter()
            .map(vk::Image::from_raw)
            .collect::<Vec<_>>();

        let clear = ClearPass::new(gpu, format, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;
        let targets = RenderTargets::new(gpu.device(), &images, format, extent, clear.render_pass())?;

        info!(
            "Session attached to window {:?} ({} headset images, {}x{} {:?})",
            window.window().id(),
            images.len(),
            extent.width,
            extent.height,
            format
        );
        self.output = Some(HeadsetOutput {
            targets,
            clear,
            swapchain,
            eye_width: eye_width as i32,
            eye_height: eye_height as i32,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drains runtime events, beginning and ending the session as the
    /// runtime asks. Returns true when the runtime wants the program to quit.
    pub fn poll_events(&mut self, shim: &RenderingShim) -> Result<bool> {
        while let Some(event) = shim
            .instance()
            .poll_event(&mut self.event_storage)
            .map_err(|err| anyhow::anyhow!("Failed to poll OpenXR events: {}", err))?
        {
            match event {
                xr::Event::SessionStateChanged(state_event) => {
                    let state = state_event.state();
                    info!("Session state changed to: {:?}", state);
                    match session_action(state) {
                        SessionAction::Begin => {
                            self.session
                                .begin(VIEW_TYPE)
                                .map_err(|err| anyhow::anyhow!("Failed to begin session: {}", err))?;
                            self.running = true;
                        }
                        SessionAction::End => {
                            self.session
                                .end()
                                .map_err(|err| anyhow::anyhow!("Failed to end session: {}", err))?;
                            self.running = false;
                        }
                        SessionAction::Quit => return Ok(true),
                        SessionAction::None => {}
                    }
                }
                xr::Event::InstanceLossPending(_) => return Ok(true),
                xr::Event::EventsLost(lost) => {
                    warn!("Lost {} OpenXR events", lost.lost_event_count());
                }
                _ => {}
            }
        }
        Ok(false)
    }

    /// One headset frame: wait for the runtime, query tracking, clear the
    /// image to `color` and hand it to the compositor.
    pub fn render(&mut self, queue: vk::Queue, color: [f32; 4]) -> Result<FrameOutcome> {
        if !self.running {
            return Ok(FrameOutcome::Idle);
        }
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Session is running but not attached"))?;

        let frame_state = self
            .frame_waiter
            .wait()
            .map_err(|err| anyhow::anyhow!("Failed to wait for frame: {}", err))?;
        self.frame_stream
            .begin()
            .map_err(|err| anyhow::anyhow!("Failed to begin frame: {}", err))?;
        let display_time = frame_state.predicted_display_time;

        if !frame_state.should_render {
            trace!("Runtime skipped frame");
            self.frame_stream
                .end(display_time, self.blend_mode, &[])
                .map_err(|err| anyhow::anyhow!("Failed to submit empty frame: {}", err))?;
            return Ok(FrameOutcome::Skipped);
        }

        // Locating the headset is what switches the display to direct output
        let tracking = if self.tracking.should_query(self.tracking_queries) {
            let location = self
                .view_space
                .locate(&self.local_space, display_time)
                .map_err(|err| anyhow::anyhow!("Failed to query tracking state: {}", err))?;
            self.tracking_queries += 1;
            let state = TrackingState::from(location);
            trace!("Headset at {:?} facing {:?}", state.position, state.forward());
            Some(state)
        } else {
            None
        };

        let (_, views) = self
            .session
            .locate_views(VIEW_TYPE, display_time, &self.local_space)
            .map_err(|err| anyhow::anyhow!("Failed to locate views: {}", err))?;
        if views.len() < 2 {
            return Err(anyhow::anyhow!("Runtime located {} views, expected 2", views.len()));
        }

        let image_index = output
            .swapchain
            .acquire_image()
            .map_err(|err| anyhow::anyhow!("Failed to acquire headset image: {}", err))?;
        output
            .swapchain
            .wait_image(xr::Duration::INFINITE)
            .map_err(|err| anyhow::anyhow!("Failed to wait for headset image: {}", err))?;

        output.clear.submit(
            queue,
            output.targets.framebuffer(image_index)?,
            output.targets.extent(),
            color,
            None,
            None,
        )?;

        output
            .swapchain
            .release_image()
            .map_err(|err| anyhow::anyhow!("Failed to release headset image: {}", err))?;

        let eye_rect = |eye: i32| xr::Rect2Di {
            offset: xr::Offset2Di {
                x: eye * output.eye_width,
                y: 0,
            },
            extent: xr::Extent2Di {
                width: output.eye_width,
                height: output.eye_height,
            },
        };
        let projection_views = [
            xr::CompositionLayerProjectionView::new()
                .pose(views[0].pose)
                .fov(views[0].fov)
                .sub_image(
                    xr::SwapchainSubImage::new()
                        .swapchain(&output.swapchain)
                        .image_array_index(0)
                        .image_rect(eye_rect(0)),
                ),
            xr::CompositionLayerProjectionView::new()
                .pose(views[1].pose)
                .fov(views[1].fov)
                .sub_image(
                    xr::SwapchainSubImage::new()
                        .swapchain(&output.swapchain)
                        .image_array_index(0)
                        .image_rect(eye_rect(1)),
                ),
        ];
        let layer = xr::CompositionLayerProjection::new()
            .space(&self.local_space)
            .views(&projection_views);

        self.frame_stream
            .end(display_time, self.blend_mode, &[&layer])
            .map_err(|err| anyhow::anyhow!("Failed to submit frame: {}", err))?;
        debug!("Submitted headset frame (image {})", image_index);

        Ok(FrameOutcome::Rendered(tracking))
    }

    pub fn tracking_queries(&self) -> u64 {
        self.tracking_queries
    }
}

impl Drop for HeadsetSession {
    fn drop(&mut self) {
        info!("Cleaning up VR session");
        if let Some(output) = &self.output {
            if let Err(err) = output.clear.wait() {
                warn!("Headset clear did not finish: {}", err);
            }
        }
        self.output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_reactions() {
        assert_eq!(session_action(xr::SessionState::READY), SessionAction::Begin);
        assert_eq!(session_action(xr::SessionState::STOPPING), SessionAction::End);
        assert_eq!(session_action(xr::SessionState::EXITING), SessionAction::Quit);
        assert_eq!(session_action(xr::SessionState::LOSS_PENDING), SessionAction::Quit);
    }

    #[test]
    fn test_passive_states_need_nothing() {
        for state in [
            xr::SessionState::IDLE,
            xr::SessionState::SYNCHRONIZED,
            xr::SessionState::VISIBLE,
            xr::SessionState::FOCUSED,
        ] {
            assert_eq!(session_action(state), SessionAction::None, "{:?}", state);
        }
    }

    #[test]
    fn test_headset_format_prefers_srgb_rgba() {
        let supported = [
            vk::Format::B8G8R8A8_SRGB.as_raw() as u32,
            vk::Format::R8G8B8A8_SRGB.as_raw() as u32,
        ];
        assert_eq!(choose_headset_format(&supported), Some(vk::Format::R8G8B8A8_SRGB));
    }

    #[test]
    fn test_headset_format_falls_back_to_unorm() {
        let supported = [
            vk::Format::D32_SFLOAT.as_raw() as u32,
            vk::Format::B8G8R8A8_UNORM.as_raw() as u32,
        ];
        assert_eq!(choose_headset_format(&supported), Some(vk::Format::B8G8R8A8_UNORM));
    }

    #[test]
    fn test_headset_format_none_supported() {
        let supported = [vk::Format::D32_SFLOAT.as_raw() as u32];
        assert_eq!(choose_headset_format(&supported), None);
        assert_eq!(choose_headset_format(&[]), None);
    }
}
