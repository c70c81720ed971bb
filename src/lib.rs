//! Minimal direct-to-headset bring-up: open a window, load the OpenXR
//! runtime, create the Vulkan device through it, start a session, attach it
//! and clear both the headset and the window to a solid colour every frame.

pub mod app;
pub mod config;
pub mod error;
pub mod graphics;
pub mod startup;
pub mod timing;
pub mod vr;
pub mod window;

pub use app::App;
pub use config::{Config, Size};
pub use error::StartupError;
pub use startup::{Stage, StartupSequence};
