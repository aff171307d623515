//! Topic based publish/subscribe used to decouple mode activation and device
//! hotplug signals from the components reacting to them.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use serde_json::Value;

use crate::error::BusError;

/// Capability shared by everything that receives bus messages.
pub trait Subscriber: Send + Sync {
    fn on_message(&self, topic: &str, data: Option<&Value>);
}

/// Subscribers are held weakly so a component that owns the bus can also
/// subscribe to it.
pub type SubscriberHandle = Weak<dyn Subscriber>;

#[derive(Default)]
pub struct MessageBus {
    subscriptions: Mutex<HashMap<String, Vec<SubscriberHandle>>>,
}

fn check_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() {
        return Err(BusError::InvalidTopic);
    }
    Ok(())
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, topic: &str, subscriber: SubscriberHandle) -> Result<(), BusError> {
        check_topic(topic)?;
        if subscriber.strong_count() == 0 {
            return Err(BusError::InvalidSubscriber);
        }
        self.lock()
            .entry(topic.to_string())
            .or_default()
            .push(subscriber);
        Ok(())
    }

    /// Remove the first registration of `subscriber` for `topic`.
    pub fn unsubscribe(&self, topic: &str, subscriber: &SubscriberHandle) {
        if let Some(subscribers) = self.lock().get_mut(topic) {
            if let Some(position) = subscribers.iter().position(|s| s.ptr_eq(subscriber)) {
                subscribers.remove(position);
            }
        }
    }

    /// Remove every registration of `subscriber` across all topics.
    pub fn unsubscribe_all(&self, subscriber: &SubscriberHandle) {
        for subscribers in self.lock().values_mut() {
            subscribers.retain(|s| !s.ptr_eq(subscriber));
        }
    }

    /// Deliver to `direct` only when given, otherwise to every subscriber of
    /// `topic` in registration order. Dropped subscribers are pruned.
    pub fn publish(
        &self,
        topic: &str,
        data: Option<&Value>,
        direct: Option<&SubscriberHandle>,
    ) -> Result<(), BusError> {
        check_topic(topic)?;

        if let Some(direct) = direct {
            let subscriber = direct.upgrade().ok_or(BusError::InvalidSubscriber)?;
            subscriber.on_message(topic, data);
            return Ok(());
        }

        // Deliver outside the lock so subscribers may (un)subscribe re-entrantly.
        let recipients: Vec<Arc<dyn Subscriber>> = {
            let mut guard = self.lock();
            let Some(subscribers) = guard.get_mut(topic) else {
                return Ok(());
            };
            subscribers.retain(|s| s.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in recipients {
            subscriber.on_message(topic, data);
        }
        Ok(())
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .get(topic)
            .map(|subscribers| subscribers.iter().filter(|s| s.strong_count() > 0).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<SubscriberHandle>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        received: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl Subscriber for Recorder {
        fn on_message(&self, topic: &str, data: Option<&Value>) {
            self.received
                .lock()
                .unwrap()
                .push((topic.to_string(), data.cloned()));
        }
    }

    impl Recorder {
        fn topics(&self) -> Vec<String> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .map(|(topic, _)| topic.clone())
                .collect()
        }
    }

    fn handle(recorder: &Arc<Recorder>) -> SubscriberHandle {
        let subscriber: Arc<dyn Subscriber> = recorder.clone();
        Arc::downgrade(&subscriber)
    }

    #[test]
    fn broadcasts_to_every_subscriber_of_a_topic() {
        let bus = MessageBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.subscribe("ping", handle(&first)).unwrap();
        bus.subscribe("ping", handle(&second)).unwrap();
        bus.subscribe("other", handle(&second)).unwrap();

        bus.publish("ping", Some(&json!(3)), None).unwrap();

        assert_eq!(first.topics(), vec!["ping"]);
        assert_eq!(second.topics(), vec!["ping"]);
        assert_eq!(first.received.lock().unwrap()[0].1, Some(json!(3)));
    }

    #[test]
    fn direct_publish_skips_topic_subscribers() {
        let bus = MessageBus::new();
        let subscribed = Arc::new(Recorder::default());
        let direct = Arc::new(Recorder::default());
        bus.subscribe("ping", handle(&subscribed)).unwrap();

        bus.publish("ping", None, Some(&handle(&direct))).unwrap();

        assert!(subscribed.topics().is_empty());
        assert_eq!(direct.topics(), vec!["ping"]);
    }

    #[test]
    fn unsubscribe_removes_one_registration_and_unsubscribe_all_removes_every_one() {
        let bus = MessageBus::new();
        let recorder = Arc::new(Recorder::default());
        let handle = handle(&recorder);
        bus.subscribe("a", handle.clone()).unwrap();
        bus.subscribe("a", handle.clone()).unwrap();
        bus.subscribe("b", handle.clone()).unwrap();

        bus.unsubscribe("a", &handle);
        assert_eq!(bus.subscriber_count("a"), 1);

        bus.unsubscribe_all(&handle);
        bus.publish("a", None, None).unwrap();
        bus.publish("b", None, None).unwrap();
        assert!(recorder.topics().is_empty());
    }

    #[test]
    fn rejects_empty_topics_and_dead_subscribers() {
        let bus = MessageBus::new();
        let recorder = Arc::new(Recorder::default());
        let live = handle(&recorder);
        assert_eq!(bus.subscribe("", live.clone()), Err(BusError::InvalidTopic));
        assert_eq!(bus.publish("", None, None), Err(BusError::InvalidTopic));

        let dead = {
            let gone = Arc::new(Recorder::default());
            handle(&gone)
        };
        assert_eq!(bus.subscribe("a", dead.clone()), Err(BusError::InvalidSubscriber));
        assert_eq!(
            bus.publish("a", None, Some(&dead)),
            Err(BusError::InvalidSubscriber)
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned_on_publish() {
        let bus = MessageBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe("a", handle(&recorder)).unwrap();
        drop(recorder);
        bus.publish("a", None, None).unwrap();
        assert_eq!(bus.subscriber_count("a"), 0);
    }
}
