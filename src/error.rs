use std::process::ExitCode;

use thiserror::Error;

use crate::startup::Stage;

/// Why the program could not reach its render loop (or left it abnormally).
#[derive(Error, Debug)]
pub enum StartupError {
    /// A stage was entered before one of the stages it depends on
    #[error("{stage} started before {missing}")]
    OutOfOrder { stage: Stage, missing: Stage },

    /// A stage was entered twice
    #[error("{0} already initialized")]
    Repeated(Stage),

    /// A runtime or graphics call failed while bringing a stage up
    #[error("{stage} failed: {reason:#}")]
    Failed { stage: Stage, reason: anyhow::Error },

    /// A render tick failed after startup completed
    #[error("render loop failed: {0:#}")]
    Render(anyhow::Error),
}

impl StartupError {
    /// Every failure is fatal to the run and maps to exit code 1.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(1)
    }
}

/// Attributes an `anyhow` failure to the stage that was being brought up.
pub trait StageContext<T> {
    fn during(self, stage: Stage) -> Result<T, StartupError>;
}

impl<T> StageContext<T> for anyhow::Result<T> {
    fn during(self, stage: Stage) -> Result<T, StartupError> {
        self.map_err(|reason| StartupError::Failed { stage, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message_names_stage_and_cause() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("no headset"));
        let err = result.during(Stage::Session).unwrap_err();
        assert!(matches!(err, StartupError::Failed { stage: Stage::Session, .. }));
        assert_eq!(err.to_string(), "VR session failed: no headset");
    }

    #[test]
    fn test_failed_message_includes_context_chain() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("ERROR_FORM_FACTOR_UNAVAILABLE"))
            .map_err(|err| err.context("Failed to get system ID"));
        let err = result.during(Stage::RenderingShim).unwrap_err();
        assert_eq!(
            err.to_string(),
            "VR rendering shim failed: Failed to get system ID: ERROR_FORM_FACTOR_UNAVAILABLE"
        );
    }

    #[test]
    fn test_ordering_errors() {
        let err = StartupError::OutOfOrder {
            stage: Stage::GraphicsDevice,
            missing: Stage::RenderingShim,
        };
        assert_eq!(err.to_string(), "graphics device started before VR rendering shim");
        assert_eq!(StartupError::Repeated(Stage::Window).to_string(), "window already initialized");
    }

    #[test]
    fn test_render_error_message() {
        let err = StartupError::Render(anyhow::anyhow!("device lost"));
        assert_eq!(err.to_string(), "render loop failed: device lost");
    }
}
