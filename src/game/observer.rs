//! Observer lists for synchronous, typed event dispatch

use std::fmt;

/// Handle returned from a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Box<dyn FnMut(&E) + Send>;

struct Entry<E> {
    id: SubscriptionId,
    /// Set for add-unique subscriptions so the same listener is never bound twice
    key: Option<String>,
    listener: Listener<E>,
}

/// Ordered list of listeners for events of type `E`.
///
/// Listeners run in registration order, synchronously, inside `notify`.
pub struct Observers<E> {
    next_id: u64,
    entries: Vec<Entry<E>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }

    /// Register a listener
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.push(None, Box::new(listener))
    }

    /// Register a listener under `key` unless one with that key already exists.
    /// Returns the id of the existing subscription in that case.
    pub fn subscribe_unique<F>(&mut self, key: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let key = key.into();
        if let Some(existing) = self
            .entries
            .iter()
            .find(|e| e.key.as_deref() == Some(key.as_str()))
        {
            return existing.id;
        }
        self.push(Some(key), Box::new(listener))
    }

    fn push(&mut self, key: Option<String>, listener: Listener<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, key, listener });
        id
    }

    /// Remove a listener, returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Invoke every listener once with `event`
    pub fn notify(&mut self, event: &E) {
        for entry in self.entries.iter_mut() {
            (entry.listener)(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn notify_reaches_every_listener_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::<i32>::new();

        let a = seen.clone();
        observers.subscribe(move |v| a.lock().unwrap().push(("a", *v)));
        let b = seen.clone();
        observers.subscribe(move |v| b.lock().unwrap().push(("b", *v)));

        observers.notify(&4);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 4), ("b", 4)]);
    }

    #[test]
    fn unique_subscription_is_only_bound_once() {
        let count = Arc::new(Mutex::new(0));
        let mut observers = Observers::<()>::new();

        let c1 = count.clone();
        let first = observers.subscribe_unique("player-1", move |_| *c1.lock().unwrap() += 1);
        let c2 = count.clone();
        let second = observers.subscribe_unique("player-1", move |_| *c2.lock().unwrap() += 1);

        assert_eq!(first, second);
        assert_eq!(observers.len(), 1);
        observers.notify(&());
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let count = Arc::new(Mutex::new(0));
        let mut observers = Observers::<u8>::new();
        let c = count.clone();
        let id = observers.subscribe(move |_| *c.lock().unwrap() += 1);

        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.notify(&1);
        assert_eq!(*count.lock().unwrap(), 0);
        assert!(observers.is_empty());
    }
}
