use std::future::ready;
use std::pin::Pin;

use serde_json::Value;
use tracing::Instrument;

use super::{Error, Tool, ToolResult};

type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// The object-safe face of a [`Tool`], used by the registry.
pub(crate) trait ToolObject: Send + Sync + 'static {
    fn description(&self) -> &str;

    /// Decodes the arguments the model produced and starts the call.
    fn execute(&self, call_id: &str, arguments: Value) -> BoxedToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    fn execute(&self, call_id: &str, arguments: Value) -> BoxedToolFuture {
        let name = self.0.name();
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                debug!("rejected arguments for {name}: {err}");
                let err = Error::invalid_input()
                    .with_reason(format!("invalid arguments: {err}"));
                return Box::pin(ready(Err(err)));
            }
        };
        let span = debug_span!("tool execute", tool = name, call = call_id);
        Box::pin(self.0.execute(input).instrument(span))
    }
}
