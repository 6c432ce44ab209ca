use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProcessingFailed, EventProducer, Handler, OrderStateChanged};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_state_changed_producer: Vec<EventProducer<OrderStateChanged>>,
    pub event_failed_producer: Vec<EventProducer<EventProcessingFailed>>,
}

pub struct EventHandlers {
    pub on_order_state_changed: Option<EventHandler<OrderStateChanged>>,
    pub on_event_failed: Option<EventHandler<EventProcessingFailed>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_state_changed = hooks.on_order_state_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_event_failed = hooks.on_event_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_state_changed, on_event_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_state_changed {
            result.order_state_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_event_failed {
            result.event_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_state_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_event_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_state_changed: Option<Handler<OrderStateChanged>>,
    pub on_event_failed: Option<Handler<EventProcessingFailed>>,
}

impl EventHooks {
    pub fn on_order_state_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStateChanged) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_state_changed = Some(Arc::new(f));
        self
    }

    pub fn on_event_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EventProcessingFailed) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_event_failed = Some(Arc::new(f));
        self
    }
}
