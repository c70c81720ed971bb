//! OpenXR side of the program: the loaded runtime, what it reports about the
//! headset, the session and the tracking query.

mod runtime;
mod session;
mod shim;
mod tracking;

pub use runtime::{choose_blend_mode, Runtime, VIEW_TYPE};
pub use session::{choose_headset_format, session_action, FrameOutcome, HeadsetSession, SessionAction};
pub use shim::{vulkan_version_supported, RenderingShim, TARGET_VULKAN_VERSION};
pub use tracking::{TrackingPolicy, TrackingState};
