//! Exact-match topic routing.
//!
//! Topics are compared as whole strings. There is no wildcard or prefix
//! matching, so `cloud/esp32` never reaches a handler registered for
//! `cloud/esp32/extra` or `myesplock`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use iotdash_model::DeviceMessage;
use tracing::debug;

/// Callback invoked for each decoded message on a registered topic.
pub type Handler = Arc<dyn Fn(&DeviceMessage) + Send + Sync>;

/// Maps topic strings to handlers.
#[derive(Clone, Default)]
pub struct TopicRouter {
    routes: HashMap<String, Vec<Handler>>,
}

impl TopicRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Several handlers may share a topic and run in
    /// registration order.
    pub fn register<F>(&mut self, topic: impl Into<String>, handler: F)
    where
        F: Fn(&DeviceMessage) + Send + Sync + 'static,
    {
        self.routes
            .entry(topic.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn route<F>(mut self, topic: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&DeviceMessage) + Send + Sync + 'static,
    {
        self.register(topic, handler);
        self
    }

    /// Deliver `message` to every handler registered for exactly `topic`.
    ///
    /// Returns the number of handlers invoked. An unmatched topic is logged
    /// and dropped.
    pub fn dispatch(&self, topic: &str, message: &DeviceMessage) -> usize {
        let Some(handlers) = self.routes.get(topic) else {
            debug!(topic, "No handler registered for topic, dropping message");
            return 0;
        };
        for handler in handlers {
            handler(message);
        }
        handlers.len()
    }
}

impl fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.routes.iter().map(|(topic, handlers)| (topic, handlers.len())))
            .finish()
    }
}
