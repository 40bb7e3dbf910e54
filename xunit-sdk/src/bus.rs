//! Message bus
//!
//! Publishing is synchronous: every interested subscriber sees a message, in
//! registration order, before `publish` returns. The result is the logical AND
//! of all subscriber results; `false` asks the producer to stop.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::trace;

use crate::messages::{Message, MessageKind};

/// A consumer of messages
pub trait MessageSink: Send + Sync {
    /// Handle one message; return `false` to ask the producer to stop
    fn on_message(&self, message: &Message) -> bool;
}

impl<S: MessageSink + ?Sized> MessageSink for Arc<S> {
    fn on_message(&self, message: &Message) -> bool {
        (**self).on_message(message)
    }
}

impl<S: MessageSink + ?Sized> MessageSink for &S {
    fn on_message(&self, message: &Message) -> bool {
        (**self).on_message(message)
    }
}

/// Adapter turning a closure into a [`MessageSink`]
pub struct FnSink<F>(pub F);

impl<F> MessageSink for FnSink<F>
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn on_message(&self, message: &Message) -> bool {
        (self.0)(message)
    }
}

/// Sink which accepts and ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn on_message(&self, _message: &Message) -> bool {
        true
    }
}

struct Subscription {
    sink: Arc<dyn MessageSink>,
    /// `None` subscribes to every kind
    interests: Option<HashSet<MessageKind>>,
}

impl Subscription {
    fn wants(&self, kind: MessageKind) -> bool {
        self.interests.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

type Route = Arc<[Arc<dyn MessageSink>]>;

/// Ordered, type-directed publish/subscribe hub
#[derive(Default)]
pub struct MessageBus {
    subscriptions: RwLock<Vec<Subscription>>,
    /// Subscribers matched per message kind; rebuilt after any subscription change
    routes: DashMap<MessageKind, Route>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every message
    pub fn subscribe(&self, sink: Arc<dyn MessageSink>) {
        self.add_subscription(Subscription { sink, interests: None });
    }

    /// Subscribe to the given message kinds only
    pub fn subscribe_to(&self, kinds: &[MessageKind], sink: Arc<dyn MessageSink>) {
        self.add_subscription(Subscription {
            sink,
            interests: Some(kinds.iter().copied().collect()),
        });
    }

    fn add_subscription(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        subscriptions.push(subscription);
        self.routes.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn route(&self, kind: MessageKind) -> Route {
        if let Some(route) = self.routes.get(&kind) {
            return route.clone();
        }

        // Holding the read lock keeps a concurrent subscribe from clearing
        // the cache between computing and storing this route.
        let subscriptions = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
        let matched: Route = subscriptions
            .iter()
            .filter(|subscription| subscription.wants(kind))
            .map(|subscription| subscription.sink.clone())
            .collect();

        self.routes.entry(kind).or_insert(matched).clone()
    }

    /// Publish a message; returns `false` if any subscriber asked to stop
    pub fn publish(&self, message: impl Into<Message>) -> bool {
        let message = message.into();
        self.publish_ref(&message)
    }

    pub fn publish_ref(&self, message: &Message) -> bool {
        let kind = message.kind();
        trace!("Publishing {:?}", kind);

        let mut keep_going = true;
        for sink in self.route(kind).iter() {
            keep_going &= sink.on_message(message);
        }
        keep_going
    }
}

impl MessageSink for MessageBus {
    fn on_message(&self, message: &Message) -> bool {
        self.publish_ref(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DiagnosticMessage, DiscoveryComplete};
    use std::sync::Mutex;

    fn recorder(name: &'static str, log: Arc<Mutex<Vec<String>>>, result: bool) -> Arc<dyn MessageSink> {
        Arc::new(FnSink(move |message: &Message| {
            log.lock().unwrap().push(format!("{}:{:?}", name, message.kind()));
            result
        }))
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = MessageBus::new();
        bus.subscribe(recorder("a", log.clone(), true));
        bus.subscribe(recorder("b", log.clone(), true));

        assert!(bus.publish(DiscoveryComplete));
        assert_eq!(*log.lock().unwrap(), vec!["a:DiscoveryComplete", "b:DiscoveryComplete"]);
    }

    #[test]
    fn test_result_is_and_of_all_subscribers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = MessageBus::new();
        bus.subscribe(recorder("stop", log.clone(), false));
        bus.subscribe(recorder("go", log.clone(), true));

        assert!(!bus.publish(DiscoveryComplete));
        // later subscribers still observe the message
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_type_directed_subscription() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = MessageBus::new();
        bus.subscribe_to(&[MessageKind::DiagnosticMessage], recorder("diag", log.clone(), false));

        assert!(bus.publish(DiscoveryComplete));
        assert!(!bus.publish(DiagnosticMessage {
            message: "note".into()
        }));
        assert_eq!(*log.lock().unwrap(), vec!["diag:DiagnosticMessage"]);
    }

    #[test]
    fn test_subscribing_invalidates_cached_routes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = MessageBus::new();
        bus.subscribe(recorder("a", log.clone(), true));
        bus.publish(DiscoveryComplete);

        bus.subscribe(recorder("b", log.clone(), true));
        bus.publish(DiscoveryComplete);

        assert_eq!(log.lock().unwrap().len(), 3);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_empty_bus_continues() {
        assert!(MessageBus::new().publish(DiscoveryComplete));
        assert!(NullSink.on_message(&DiscoveryComplete.into()));
    }
}
