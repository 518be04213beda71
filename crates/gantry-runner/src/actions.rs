//! Action handlers for the local runner provider.
//!
//! External actions and toolchain installers are opaque plugins to the
//! engine; the local provider resolves them through this registry.
//! Toolchain setup steps dispatch under [`TOOLCHAIN_ACTION`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Exit code reported when no handler is registered for an action id,
/// matching the shell convention for a missing command.
pub const EXIT_UNAVAILABLE: i32 = 127;

/// Id the toolchain setup step dispatches through.
pub const TOOLCHAIN_ACTION: &str = "toolchain-setup";

type Handler = Arc<dyn Fn(&HashMap<String, String>) -> i32 + Send + Sync>;

/// Maps action ids to local handlers.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Handler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an action id.
    pub fn register<F>(&mut self, id: impl Into<String>, handler: F)
    where
        F: Fn(&HashMap<String, String>) -> i32 + Send + Sync + 'static,
    {
        self.handlers.insert(id.into(), Arc::new(handler));
    }

    /// Run the handler for `id`, or report it unavailable.
    pub fn dispatch(&self, id: &str, params: &HashMap<String, String>) -> i32 {
        match self.handlers.get(id) {
            Some(handler) => handler(params),
            None => {
                warn!(action = id, "no local handler for action");
                EXIT_UNAVAILABLE
            }
        }
    }
}
