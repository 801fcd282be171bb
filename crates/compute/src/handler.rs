use digestflow_schedule::TriggerEvent;

use crate::context::InvocationContext;
use crate::error::InvocationError;

/// Code behind a compute unit's entry point.
///
/// The event carries timing metadata only; everything else comes from the
/// context. Returning `Ok` is the only way a buffered publish reaches the
/// sink.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, event: &TriggerEvent, ctx: &InvocationContext) -> Result<(), InvocationError>;
}

impl<F> Handler for F
where
    F: Fn(&TriggerEvent, &InvocationContext) -> Result<(), InvocationError> + Send + Sync + 'static,
{
    fn handle(&self, event: &TriggerEvent, ctx: &InvocationContext) -> Result<(), InvocationError> {
        self(event, ctx)
    }
}
