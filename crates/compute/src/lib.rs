//! `digestflow-compute`
//!
//! **Responsibility:** run one stateless, time-bounded invocation of a compute
//! unit.
//!
//! - Configuration is an immutable [`EnvConfig`] built at deploy time and
//!   handed to the handler through its [`InvocationContext`].
//! - Every external call is checked against the unit's permission grant.
//! - Publishes are buffered and only reach the sink when the handler
//!   finishes successfully inside its execution bound.
//! - Overlapping runs of one unit are guarded by a lease.

pub mod context;
pub mod env;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod lease;
pub mod secret;
pub mod unit;

pub use context::InvocationContext;
pub use env::{ConfigValue, EnvConfig, EnvRequirements, keys};
pub use error::{ConfigError, InvocationError};
pub use handler::Handler;
pub use invoker::{InvocationOutcome, InvocationRecord, Invoker, UnitRuntime};
pub use lease::{ConcurrencyPolicy, LeaseGuard, RunLeases};
pub use secret::{InMemorySecretStore, SecretStore, SecretString};
pub use unit::{ComputeUnitSpec, HandlerRef, MAX_TIMEOUT_SECS};
