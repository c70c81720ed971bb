use anyhow::{bail, Context, Result};

use crate::vr::TrackingPolicy;

pub const APPLICATION_NAME: &str = "barebones-direct";
pub const WINDOW_TITLE: &str = "Barebones Direct-to-Headset";

/// Green, just to show that it's working.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The window size has no relation to the back buffer size, or even its
    /// aspect ratio.
    pub window_size: Size,
    /// Honored only when the surface lets the application pick its extent.
    pub back_buffer_size: Size,
    pub clear_color: [f32; 4],
    pub tracking: TrackingPolicy,
    pub mirror_to_window: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: Size::new(1280, 720),
            back_buffer_size: Size::new(1920, 1080),
            clear_color: DEFAULT_CLEAR_COLOR,
            tracking: TrackingPolicy::EveryFrame,
            mirror_to_window: true,
        }
    }
}

/// Parses `WxH` (or `WXH`) into a non-zero size.
pub fn parse_size(value: &str) -> Result<Size> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width = parse_dimension(width)?;
    let height = parse_dimension(height)?;
    Ok(Size::new(width, height))
}

pub fn parse_dimension(value: &str) -> Result<u32> {
    let dimension: u32 = value
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a valid dimension", value))?;
    if dimension == 0 {
        bail!("dimensions must be greater than zero");
    }
    Ok(dimension)
}

/// Parses `R,G,B` or `R,G,B,A` with every component in [0, 1].
pub fn parse_color(value: &str) -> Result<[f32; 4]> {
    let components = value
        .split(',')
        .map(|component| {
            component
                .trim()
                .parse::<f32>()
                .with_context(|| format!("'{}' is not a number", component.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    let color = match components.as_slice() {
        [r, g, b] => [*r, *g, *b, 1.0],
        [r, g, b, a] => [*r, *g, *b, *a],
        _ => bail!("expected 3 or 4 components, got {}", components.len()),
    };

    if let Some(component) = color.iter().find(|c| !(0.0..=1.0).contains(*c)) {
        bail!("color components must be within [0, 1], got {}", component);
    }
    Ok(color)
}
