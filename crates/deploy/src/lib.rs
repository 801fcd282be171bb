//! `digestflow-deploy`
//!
//! **Responsibility:** turn one parameterized descriptor into a provisioned
//! stack.
//!
//! - [`synthesize`] builds a typed [`ResourceGraph`] (topic, subscriptions,
//!   compute unit, grant, schedule rule, output) and validates it before
//!   anything is provisioned.
//! - [`plan`] diffs a desired graph against the deployed one.
//! - [`SimulatedPlatform`] applies graphs atomically and runs the deployed
//!   pipeline against a manual clock.

pub mod config;
pub mod error;
pub mod graph;
pub mod plan;
pub mod platform;
pub mod synth;

mod integration_tests;

pub use config::{
    DescriptorConfig, ENV_PREFIX, GrantMode, ModelScope, Packaging, ScheduleConfig, SubscriberConfig,
};
pub use error::DeployError;
pub use graph::{LogicalId, Ref, Resource, ResourceGraph, ResourceKind, ResourceSpec};
pub use plan::{ChangeAction, Plan, ResourceChange, plan};
pub use platform::{DeployReport, SimulatedPlatform, TickReport};
pub use synth::{Synthesis, synthesize};
