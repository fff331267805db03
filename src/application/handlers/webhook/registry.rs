//! Event-type to handler routing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::webhook::{StripeEventType, WebhookDispatcher, WebhookEventHandler};

/// Dispatcher built from handlers' declared event types.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StripeEventType, Arc<dyn WebhookEventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every type it declares. Later registrations
    /// replace earlier ones for the same type.
    pub fn register(mut self, handler: Arc<dyn WebhookEventHandler>) -> Self {
        for event_type in handler.handles() {
            if self.handlers.insert(event_type, handler.clone()).is_some() {
                tracing::warn!(event_type = event_type.as_str(), "webhook handler replaced");
            }
        }
        self
    }

    pub fn registered_types(&self) -> Vec<StripeEventType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

#[async_trait]
impl WebhookDispatcher for HandlerRegistry {
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler> {
        self.handlers.get(event_type).map(|h| h.as_ref())
    }
}
