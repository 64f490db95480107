//! Lifecycle event dispatch
//!
//! Events fire around entity persistence and registration. Handlers run
//! in priority order and may veto the operation by returning an error;
//! pre-phase errors abort the operation before anything is written.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::Entity;
use crate::error::OdmResult;

/// An event in flight. Entity-carrying variants hand handlers a mutable
/// borrow so they can adjust field values before persistence.
pub enum EntityEvent<'a> {
    Register { model: &'a str },
    PreSave(&'a mut Entity),
    Save { entity: &'a mut Entity, first_save: bool },
    PreDelete(&'a mut Entity),
    Delete(&'a mut Entity),
    FinderCacheClear { model: &'a str },
}

impl EntityEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            EntityEvent::Register { .. } => "register",
            EntityEvent::PreSave(_) => "pre_save",
            EntityEvent::Save { .. } => "save",
            EntityEvent::PreDelete(_) => "pre_delete",
            EntityEvent::Delete(_) => "delete",
            EntityEvent::FinderCacheClear { .. } => "finder_cache_clear",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            EntityEvent::Register { model } | EntityEvent::FinderCacheClear { model } => model,
            EntityEvent::PreSave(e) | EntityEvent::PreDelete(e) | EntityEvent::Delete(e) => {
                e.model()
            }
            EntityEvent::Save { entity, .. } => entity.model(),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&mut EntityEvent<'_>) -> OdmResult<()> + Send + Sync>;

pub trait EventBus: Send + Sync {
    fn fire(&self, event: &mut EntityEvent<'_>) -> OdmResult<()>;
}

/// A bus that drops every event
pub struct NullBus;

impl EventBus for NullBus {
    fn fire(&self, _event: &mut EntityEvent<'_>) -> OdmResult<()> {
        Ok(())
    }
}

struct Subscription {
    topic: String,
    priority: i32,
    handler: EventHandler,
}

/// In-process bus dispatching to registered handlers.
///
/// Topics are event names, optionally scoped to a model with
/// `"name:model"`. Lower priority runs first.
#[derive(Default)]
pub struct HandlerBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl HandlerBus {
    pub fn new() -> Self {
        HandlerBus::default()
    }

    pub fn on<F>(&self, topic: impl Into<String>, priority: i32, handler: F)
    where
        F: Fn(&mut EntityEvent<'_>) -> OdmResult<()> + Send + Sync + 'static,
    {
        let mut subs = self.subscriptions.write();
        subs.push(Subscription {
            topic: topic.into(),
            priority,
            handler: Arc::new(handler),
        });
        subs.sort_by_key(|s| s.priority);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }
}

impl EventBus for HandlerBus {
    fn fire(&self, event: &mut EntityEvent<'_>) -> OdmResult<()> {
        let scoped = format!("{}:{}", event.name(), event.model());
        // Matching handlers are collected first so a handler may register
        // further subscriptions without deadlocking the bus.
        let matching: Vec<EventHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == event.name() || s.topic == scoped)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in matching {
            handler(event)?;
        }

        Ok(())
    }
}
