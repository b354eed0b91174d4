//! One-time lifecycle listeners attached to a host record.
//!
//! A listener is registered for one [`LifecycleEvent`] together with a string
//! payload. When the host fires the event, every listener registered for it is
//! removed from the registry and run in registration order, receiving the host
//! and an [`EventContext`] carrying the payload.

use crate::error::PivotResult;
use crate::record::ActiveRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Save lifecycle events a host record can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Fired after a new record was inserted.
    AfterInsert,
    /// Fired after an existing record was updated.
    AfterUpdate,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AfterInsert => f.write_str("after_insert"),
            Self::AfterUpdate => f.write_str("after_update"),
        }
    }
}

/// What a listener receives when its event fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub event: LifecycleEvent,
    /// Payload bound at registration time.
    pub data: String,
}

type Handler<H> = Box<dyn FnOnce(&mut H, &EventContext) -> PivotResult<()>>;

struct Listener<H> {
    event: LifecycleEvent,
    key: Option<String>,
    data: String,
    handler: Handler<H>,
}

/// Registry of pending one-time listeners for a host of type `H`.
pub struct Events<H> {
    listeners: Vec<Listener<H>>,
}

impl<H> Default for Events<H> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<H> fmt::Debug for Events<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.listeners.iter().map(|l| (l.event, &l.data)))
            .finish()
    }
}

impl<H> Events<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-time listener.
    pub fn on<F>(&mut self, event: LifecycleEvent, data: impl Into<String>, handler: F)
    where
        F: FnOnce(&mut H, &EventContext) -> PivotResult<()> + 'static,
    {
        self.listeners.push(Listener {
            event,
            key: None,
            data: data.into(),
            handler: Box::new(handler),
        });
    }

    /// Registers a listener identified by `key` unless one with the same key,
    /// event and payload is already pending. Returns whether it was added.
    pub fn on_keyed<F>(
        &mut self,
        event: LifecycleEvent,
        key: &str,
        data: impl Into<String>,
        handler: F,
    ) -> bool
    where
        F: FnOnce(&mut H, &EventContext) -> PivotResult<()> + 'static,
    {
        let data = data.into();
        let pending = self
            .listeners
            .iter()
            .any(|l| l.event == event && l.key.as_deref() == Some(key) && l.data == data);
        if pending {
            return false;
        }
        self.listeners.push(Listener {
            event,
            key: Some(key.to_string()),
            data,
            handler: Box::new(handler),
        });
        true
    }

    pub fn has_listeners(&self, event: LifecycleEvent) -> bool {
        self.listeners.iter().any(|l| l.event == event)
    }

    pub fn listener_count(&self, event: LifecycleEvent) -> usize {
        self.listeners.iter().filter(|l| l.event == event).count()
    }

    /// Drops every pending listener for `event`. Returns how many were removed.
    pub fn off(&mut self, event: LifecycleEvent) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.event != event);
        before - self.listeners.len()
    }
}

impl<H: ActiveRecord> Events<H> {
    /// Fires `event` on `owner`.
    ///
    /// Due listeners are taken out of the registry before any of them runs.
    /// The first failure stops the cycle; listeners that did not get to run
    /// are put back so a later save can fire them.
    pub fn trigger(owner: &mut H, event: LifecycleEvent) -> PivotResult<()> {
        let listeners = std::mem::take(&mut owner.events_mut().listeners);
        let (due, rest): (Vec<_>, Vec<_>) = listeners.into_iter().partition(|l| l.event == event);
        owner.events_mut().listeners = rest;

        debug!("Firing {} with {} listener(s)", event, due.len());

        let mut due = due.into_iter();
        while let Some(listener) = due.next() {
            let context = EventContext {
                event,
                data: listener.data,
            };
            if let Err(err) = (listener.handler)(owner, &context) {
                let mut remaining: Vec<_> = due.collect();
                if !remaining.is_empty() {
                    debug!("Re-arming {} listener(s) for {}", remaining.len(), event);
                    let registry = owner.events_mut();
                    remaining.append(&mut registry.listeners);
                    registry.listeners = remaining;
                }
                return Err(err);
            }
        }
        Ok(())
    }
}
