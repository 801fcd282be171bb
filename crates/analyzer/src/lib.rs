//! `digestflow-analyzer`
//!
//! **Responsibility:** the code behind the analysis unit.
//!
//! Reads the last day of a channel, asks a hosted model for two analyses and
//! publishes one report. The channel and the model are traits so the pipeline
//! can run end to end without network access.
//!
//! This crate is not part of the orchestration core:
//! - It only sees what its [`digestflow_compute::InvocationContext`] exposes.
//! - Prompt wording is deliberately plain and carries no tuning.

pub mod channel;
pub mod digest;
pub mod error;
pub mod model;
pub mod report;

pub use channel::{ChannelMessage, ChannelReader, StaticChannel, HISTORY_LIMIT};
pub use digest::DigestHandler;
pub use error::AnalysisError;
pub use model::{ModelClient, ScriptedModel};
pub use report::{Analysis, DigestReport, REPORT_SUBJECT};
