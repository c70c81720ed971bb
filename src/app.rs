use anyhow::Result;
use log::{debug, info, warn};

use crate::config::{Config, WINDOW_TITLE};
use crate::error::{StageContext, StartupError};
use crate::graphics::{GraphicsContext, Presented, WindowSwapchain};
use crate::startup::{Stage, StartupSequence};
use crate::timing::TickTimer;
use crate::vr::{FrameOutcome, HeadsetSession, RenderingShim, Runtime};
use crate::window::{idle_delay, WindowShell};

/// Everything the program acquires, released in reverse order of acquisition
/// by field declaration order.
pub struct App {
    session: HeadsetSession,
    runtime: Runtime,
    mirror: Option<WindowSwapchain>,
    gpu: GraphicsContext,
    shim: RenderingShim,
    window: WindowShell,
    config: Config,
    sequence: StartupSequence,
    timer: TickTimer,
}

impl App {
    /// Brings every stage up in order. Whatever was acquired before a failure
    /// is released on the way out.
    pub fn bootstrap(config: Config) -> Result<Self, StartupError> {
        let mut sequence = StartupSequence::new();

        sequence.enter(Stage::Window)?;
        let window = WindowShell::new(WINDOW_TITLE, config.window_size).during(Stage::Window)?;

        sequence.enter(Stage::RenderingShim)?;
        let shim = RenderingShim::initialize().during(Stage::RenderingShim)?;

        sequence.enter(Stage::GraphicsDevice)?;
        let gpu = GraphicsContext::new(&shim, &window).during(Stage::GraphicsDevice)?;
        let mirror = if config.mirror_to_window {
            Some(WindowSwapchain::new(&gpu, config.back_buffer_size).during(Stage::GraphicsDevice)?)
        } else {
            info!("Desktop mirror disabled");
            None
        };

        sequence.enter(Stage::Runtime)?;
        let runtime = Runtime::initialize(&shim).during(Stage::Runtime)?;

        sequence.enter(Stage::Session)?;
        let mut session =
            HeadsetSession::create(&shim, &runtime, &gpu, config.tracking).during(Stage::Session)?;

        sequence.enter(Stage::Attach)?;
        session.attach(&gpu, &window).during(Stage::Attach)?;

        debug_assert!(sequence.is_complete());
        info!(
            "Startup complete after {} stages, entering render loop",
            sequence.order().len()
        );
        Ok(Self {
            session,
            runtime,
            mirror,
            gpu,
            shim,
            window,
            config,
            sequence,
            timer: TickTimer::new(),
        })
    }

    /// Pumps window messages and renders until the window closes or the
    /// runtime asks to quit.
    pub fn run(&mut self) -> Result<(), StartupError> {
        loop {
            self.window.pump();
            if self.window.should_quit() {
                info!("Quit requested from window");
                break;
            }

            if self.tick().map_err(StartupError::Render)? {
                info!("Quit requested by runtime");
                break;
            }

            let delay = idle_delay(
                self.window.is_minimized(),
                self.session.is_running(),
                self.mirror.is_some(),
            );
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
        }
        Ok(())
    }

    /// One pass of the render loop. Returns true when the runtime wants to
    /// quit.
    fn tick(&mut self) -> Result<bool> {
        self.timer.begin_tick();

        if self.session.poll_events(&self.shim)? {
            return Ok(true);
        }

        let color = self.config.clear_color;
        match self.session.render(self.gpu.queue(), color)? {
            FrameOutcome::Rendered(Some(tracking)) => {
                if !self.sequence.has_entered(Stage::Tracking) {
                    self.sequence.enter(Stage::Tracking)?;
                    info!(
                        "Headset tracking {} on {}",
                        if tracking.is_tracked() { "active" } else { "not yet active" },
                        self.runtime.system_name()
                    );
                }
            }
            FrameOutcome::Rendered(None) | FrameOutcome::Skipped | FrameOutcome::Idle => {}
        }

        if let Some(mirror) = &mut self.mirror {
            if self.window.take_resized() {
                mirror.mark_resized();
            }
            if let Presented::OutOfDate = mirror.present(self.gpu.queue(), color)? {
                debug!("Window swap chain out of date, rebuilding on next tick");
            }
        }

        if let Some(stats) = self.timer.end_tick() {
            debug!(
                "{} ticks ({:.1} fps), avg {:.2} ms, max {:.2} ms",
                stats.ticks, stats.fps, stats.average_tick_ms, stats.max_tick_ms
            );
        }
        Ok(false)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        info!(
            "Shutting down after {} tracking queries",
            self.session.tracking_queries()
        );
        if let Err(err) = self.gpu.wait_idle() {
            warn!("Device did not go idle before shutdown: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    struct Held(&'static str, Log);

    impl Drop for Held {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    // Same field order as `App`
    #[allow(dead_code)]
    struct Resources {
        session: Held,
        runtime: Held,
        mirror: Held,
        gpu: Held,
        shim: Held,
        window: Held,
    }

    #[test]
    fn test_resources_release_in_reverse_acquisition_order() {
        let log = Log::default();
        let acquire = |name| Held(name, log.clone());

        // Acquired in the order `App::bootstrap` does
        let window = acquire("window");
        let shim = acquire("shim");
        let gpu = acquire("gpu");
        let mirror = acquire("mirror");
        let runtime = acquire("runtime");
        let session = acquire("session");
        drop(Resources {
            session,
            runtime,
            mirror,
            gpu,
            shim,
            window,
        });

        assert_eq!(
            *log.borrow(),
            ["session", "runtime", "mirror", "gpu", "shim", "window"]
        );
    }
}
