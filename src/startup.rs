//! Bring-up order for direct mode.
//!
//! Direct output only activates when the runtime is loaded before the
//! graphics device exists and the headset is queried after the session is
//! attached. `StartupSequence` records the stages as the bootstrap enters
//! them and refuses any stage whose prerequisites have not run.

use std::fmt;

use crate::error::StartupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Window,
    RenderingShim,
    GraphicsDevice,
    Runtime,
    Session,
    Attach,
    Tracking,
}

impl Stage {
    /// All stages in canonical bring-up order.
    pub const ALL: [Stage; 7] = [
        Stage::Window,
        Stage::RenderingShim,
        Stage::GraphicsDevice,
        Stage::Runtime,
        Stage::Session,
        Stage::Attach,
        Stage::Tracking,
    ];

    pub fn prerequisites(self) -> &'static [Stage] {
        match self {
            Stage::Window => &[],
            Stage::RenderingShim => &[],
            // The device has to be created through the loaded runtime
            Stage::GraphicsDevice => &[Stage::Window, Stage::RenderingShim],
            Stage::Runtime => &[Stage::RenderingShim],
            Stage::Session => &[Stage::GraphicsDevice, Stage::Runtime],
            Stage::Attach => &[Stage::Session, Stage::Window],
            Stage::Tracking => &[Stage::Attach],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Window => "window",
            Stage::RenderingShim => "VR rendering shim",
            Stage::GraphicsDevice => "graphics device",
            Stage::Runtime => "VR runtime",
            Stage::Session => "VR session",
            Stage::Attach => "session attach",
            Stage::Tracking => "tracking query",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default, Clone)]
pub struct StartupSequence {
    entered: u8,
    order: Vec<Stage>,
}

impl StartupSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, stage: Stage) -> Result<(), StartupError> {
        if self.has_entered(stage) {
            return Err(StartupError::Repeated(stage));
        }
        if let Some(&missing) = stage
            .prerequisites()
            .iter()
            .find(|&&required| !self.has_entered(required))
        {
            return Err(StartupError::OutOfOrder { stage, missing });
        }

        log::info!("[{}/{}] {}", self.order.len() + 1, Stage::ALL.len(), stage);
        self.entered |= stage.bit();
        self.order.push(stage);
        Ok(())
    }

    pub fn has_entered(&self, stage: Stage) -> bool {
        self.entered & stage.bit() != 0
    }

    /// Everything up to attaching the session has run. Tracking happens from
    /// the render loop once the runtime hands out a frame.
    pub fn is_complete(&self) -> bool {
        Stage::ALL[..Stage::ALL.len() - 1]
            .iter()
            .all(|&stage| self.has_entered(stage))
    }

    pub fn order(&self) -> &[Stage] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stages: &[Stage]) -> Result<StartupSequence, StartupError> {
        let mut sequence = StartupSequence::new();
        for &stage in stages {
            sequence.enter(stage)?;
        }
        Ok(sequence)
    }

    #[test_log::test]
    fn test_canonical_order_is_accepted() {
        let sequence = run(&Stage::ALL).unwrap();
        assert!(sequence.is_complete());
        assert_eq!(sequence.order(), &Stage::ALL);
    }

    #[test]
    fn test_complete_before_tracking() {
        let sequence = run(&Stage::ALL[..6]).unwrap();
        assert!(sequence.is_complete());
        assert!(!sequence.has_entered(Stage::Tracking));
    }

    #[test]
    fn test_shim_may_precede_window() {
        let sequence = run(&[Stage::RenderingShim, Stage::Window, Stage::GraphicsDevice]).unwrap();
        assert!(sequence.has_entered(Stage::GraphicsDevice));
        assert!(!sequence.is_complete());
    }

    #[test]
    fn test_runtime_may_follow_device() {
        assert!(run(&[Stage::RenderingShim, Stage::Runtime, Stage::Window, Stage::GraphicsDevice]).is_ok());
    }

    #[test]
    fn test_graphics_before_shim_is_rejected() {
        let err = run(&[Stage::Window, Stage::GraphicsDevice]).unwrap_err();
        match err {
            StartupError::OutOfOrder { stage, missing } => {
                assert_eq!(stage, Stage::GraphicsDevice);
                assert_eq!(missing, Stage::RenderingShim);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_session_before_runtime_is_rejected() {
        let err = run(&[Stage::Window, Stage::RenderingShim, Stage::GraphicsDevice, Stage::Session])
            .unwrap_err();
        assert!(matches!(
            err,
            StartupError::OutOfOrder { stage: Stage::Session, missing: Stage::Runtime }
        ));
    }

    #[test]
    fn test_tracking_before_attach_is_rejected() {
        let err = run(&[
            Stage::Window,
            Stage::RenderingShim,
            Stage::GraphicsDevice,
            Stage::Runtime,
            Stage::Session,
            Stage::Tracking,
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            StartupError::OutOfOrder { stage: Stage::Tracking, missing: Stage::Attach }
        ));
    }

    #[test]
    fn test_repeated_stage_is_rejected() {
        let err = run(&[Stage::Window, Stage::Window]).unwrap_err();
        assert!(matches!(err, StartupError::Repeated(Stage::Window)));
    }

    #[test]
    fn test_failed_entry_leaves_sequence_unchanged() {
        let mut sequence = StartupSequence::new();
        sequence.enter(Stage::Window).unwrap();
        assert!(sequence.enter(Stage::Session).is_err());
        assert_eq!(sequence.order(), &[Stage::Window]);
        assert!(!sequence.has_entered(Stage::Session));
    }

    #[test]
    fn test_prerequisites_precede_each_stage_in_canonical_order() {
        for (index, stage) in Stage::ALL.iter().enumerate() {
            for required in stage.prerequisites() {
                let position = Stage::ALL.iter().position(|s| s == required).unwrap();
                assert!(position < index, "{required} should precede {stage}");
            }
        }
    }
}
