use std::time::Duration;

use anyhow::Result;
use log::{debug, info};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowBuilder},
};

use crate::config::Size;

/// How long to idle per tick while the window is minimized.
pub const MINIMIZED_SLEEP: Duration = Duration::from_millis(10);

/// How long to idle per tick while the runtime has not started the session
/// and nothing is drawn to the window.
pub const SESSION_IDLE_SLEEP: Duration = Duration::from_millis(100);

/// The subset of system messages this program reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    Created,
    KeyDown(KeyCode),
    Resized,
    Close,
    Quit,
    Other,
}

/// Sets the quit flag on escape, close and quit, and flags resizes for the
/// swap chain.
#[derive(Debug, Default)]
pub struct MessageHandler {
    quit: bool,
    resized: bool,
}

impl MessageHandler {
    pub fn handle(&mut self, message: WindowMessage) {
        match message {
            WindowMessage::Created => debug!("Window created"),
            WindowMessage::KeyDown(KeyCode::Escape) | WindowMessage::Close | WindowMessage::Quit => {
                self.quit = true;
            }
            WindowMessage::Resized => self.resized = true,
            WindowMessage::KeyDown(_) | WindowMessage::Other => {}
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Returns whether a resize arrived since the last call.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}

impl WindowMessage {
    fn from_event(event: &Event<()>) -> Self {
        match event {
            Event::Resumed => WindowMessage::Created,
            Event::LoopExiting => WindowMessage::Quit,
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(key_code),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => WindowMessage::KeyDown(*key_code),
                WindowEvent::Resized(_) => WindowMessage::Resized,
                WindowEvent::CloseRequested => WindowMessage::Close,
                WindowEvent::Destroyed => WindowMessage::Quit,
                _ => WindowMessage::Other,
            },
            _ => WindowMessage::Other,
        }
    }
}

/// How long to wait per tick. Nothing paces the loop while the session is
/// not running, so it sleeps then too, longer when there is no mirror.
pub fn idle_delay(minimized: Option<bool>, session_running: bool, mirrored: bool) -> Option<Duration> {
    if minimized == Some(true) {
        return Some(MINIMIZED_SLEEP);
    }
    match (session_running, mirrored) {
        (true, _) => None,
        (false, true) => Some(MINIMIZED_SLEEP),
        (false, false) => Some(SESSION_IDLE_SLEEP),
    }
}

/// Native window plus the event loop that feeds it, polled without blocking.
pub struct WindowShell {
    // The window must go before the event loop that owns its connection.
    window: Window,
    event_loop: EventLoop<()>,
    handler: MessageHandler,
}

impl WindowShell {
    pub fn new(title: &str, size: Size) -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|err| anyhow::anyhow!("Failed to create event loop: {}", err))?;

        // Resizable and decorated for convenience while running; direct mode
        // does not depend on the window style.
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(size.width, size.height))
            .with_visible(true)
            .build(&event_loop)
            .map_err(|err| anyhow::anyhow!("Failed to create window: {}", err))?;

        let inner = window.inner_size();
        info!("Window created ({}x{})", inner.width, inner.height);

        Ok(Self {
            window,
            event_loop,
            handler: MessageHandler::default(),
        })
    }

    /// Dispatches every pending message and returns without waiting for more.
    pub fn pump(&mut self) {
        let window_id = self.window.id();
        let handler = &mut self.handler;
        let status = self.event_loop.pump_events(Some(Duration::ZERO), |event, _| {
            let message = match &event {
                Event::WindowEvent { window_id: id, .. } if *id != window_id => return,
                _ => WindowMessage::from_event(&event),
            };
            if message != WindowMessage::Other {
                debug!("Window message: {:?}", message);
            }
            handler.handle(message);
        });

        if let PumpStatus::Exit(code) = status {
            debug!("Event loop exited with code {}", code);
            self.handler.handle(WindowMessage::Quit);
        }
    }

    pub fn should_quit(&self) -> bool {
        self.handler.should_quit()
    }

    pub fn take_resized(&mut self) -> bool {
        self.handler.take_resized()
    }

    pub fn is_minimized(&self) -> Option<bool> {
        self.window.is_minimized()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.raw_display_handle()
    }

    pub fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.raw_window_handle()
    }
}

impl Drop for WindowShell {
    fn drop(&mut self) {
        info!("Cleaning up window");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_sets_quit() {
        let mut handler = MessageHandler::default();
        handler.handle(WindowMessage::KeyDown(KeyCode::Escape));
        assert!(handler.should_quit());
    }

    #[test]
    fn test_other_keys_do_not_quit() {
        let mut handler = MessageHandler::default();
        handler.handle(WindowMessage::KeyDown(KeyCode::KeyQ));
        handler.handle(WindowMessage::KeyDown(KeyCode::Space));
        assert!(!handler.should_quit());
    }

    #[test]
    fn test_close_and_quit_set_quit() {
        for message in [WindowMessage::Close, WindowMessage::Quit] {
            let mut handler = MessageHandler::default();
            handler.handle(message);
            assert!(handler.should_quit());
        }
    }

    #[test]
    fn test_creation_and_unrelated_messages_do_not_quit() {
        let mut handler = MessageHandler::default();
        handler.handle(WindowMessage::Created);
        handler.handle(WindowMessage::Other);
        assert!(!handler.should_quit());
        assert!(!handler.take_resized());
    }

    #[test]
    fn test_quit_flag_is_sticky() {
        let mut handler = MessageHandler::default();
        handler.handle(WindowMessage::Close);
        handler.handle(WindowMessage::Other);
        handler.handle(WindowMessage::Created);
        assert!(handler.should_quit());
    }

    #[test]
    fn test_resize_is_taken_once() {
        let mut handler = MessageHandler::default();
        handler.handle(WindowMessage::Resized);
        assert!(handler.take_resized());
        assert!(!handler.take_resized());
    }

    #[test]
    fn test_minimized_window_sleeps_briefly() {
        assert_eq!(idle_delay(Some(true), true, true), Some(MINIMIZED_SLEEP));
        assert_eq!(idle_delay(Some(true), false, false), Some(MINIMIZED_SLEEP));
    }

    #[test]
    fn test_running_session_is_not_delayed() {
        assert_eq!(idle_delay(Some(false), true, true), None);
        assert_eq!(idle_delay(None, true, false), None);
    }

    #[test]
    fn test_waiting_for_session_does_not_spin() {
        assert_eq!(idle_delay(Some(false), false, false), Some(SESSION_IDLE_SLEEP));
        assert_eq!(idle_delay(None, false, false), Some(SESSION_IDLE_SLEEP));
        // The mirror keeps redrawing at a reduced rate
        assert_eq!(idle_delay(Some(false), false, true), Some(MINIMIZED_SLEEP));
    }
}
