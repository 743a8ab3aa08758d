// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::ids::ListenerId;
use crate::model::SessionUser;

pub type SessionListener = Box<dyn Fn(Option<&SessionUser>) + Send + Sync>;

type SharedListener = Arc<dyn Fn(Option<&SessionUser>) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    current: Option<SessionUser>,
    listeners: BTreeMap<ListenerId, SharedListener>,
    next_id: ListenerId,
}

/// Current signed-in user plus everyone who wants to hear about changes.
#[derive(Clone, Default)]
pub struct SessionHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        lock(&self.inner).current.clone()
    }

    /// Replaces the current user and notifies listeners if it changed.
    ///
    /// Listeners run after the hub lock is released, so they may call back
    /// into the hub or drop their own subscription.
    pub fn set_user(&self, user: Option<SessionUser>) {
        let (current, listeners) = {
            let mut inner = lock(&self.inner);
            if inner.current == user {
                return;
            }
            inner.current = user;
            let listeners: Vec<SharedListener> = inner.listeners.values().cloned().collect();
            (inner.current.clone(), listeners)
        };

        match &current {
            Some(user) => tracing::info!(email = %user.email, "session started"),
            None => tracing::info!("session ended"),
        }
        for listener in listeners {
            listener(current.as_ref());
        }
    }

    /// Registers `listener`; it stays registered until the returned guard drops.
    pub fn subscribe(&self, listener: SessionListener) -> Subscription {
        let mut inner = lock(&self.inner);
        inner.next_id = inner.next_id.next();
        let id = inner.next_id;
        inner.listeners.insert(id, Arc::from(listener));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

/// Unsubscribes on drop. Outliving the hub is fine.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<Mutex<HubInner>>,
    id: ListenerId,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            lock(&inner).listeners.remove(&self.id);
        }
    }
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
