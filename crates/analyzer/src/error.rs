use thiserror::Error;

use digestflow_compute::InvocationError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("channel history unavailable: {0}")]
    Channel(String),

    #[error("channel rejected the bot token")]
    Unauthorized,

    #[error("model invocation failed: {0}")]
    Model(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

impl From<AnalysisError> for InvocationError {
    fn from(err: AnalysisError) -> Self {
        let capability = match err {
            AnalysisError::Channel(_) | AnalysisError::Unauthorized => "channel",
            AnalysisError::Model(_) | AnalysisError::EmptyResponse => "model",
        };
        InvocationError::external(capability, err.to_string())
    }
}
