// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock resource with scripted behavior.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rescon_core::{AttributeNotifier, Attributes, BundleResource, ContainerError, RequestContext};

use crate::lock;

/// What the resource does when called.
#[derive(Debug, Clone, Default)]
pub enum Behavior {
    #[default]
    Normal,
    /// Sleep before answering.
    Delay(Duration),
    /// Block until the request is cancelled, then fail.
    HangUntilCancelled,
    /// Return a plugin error.
    Fail(String),
    Panic,
}

/// A resource backed by an in-memory attribute map.
pub struct MockResource {
    attributes: Mutex<Attributes>,
    names: Vec<String>,
    behavior: Mutex<Behavior>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    received: Mutex<Vec<Attributes>>,
    notifier: Mutex<Option<AttributeNotifier>>,
}

impl MockResource {
    /// Create a resource exposing exactly the attributes in `attributes`.
    pub fn new(attributes: Attributes) -> Self {
        let names = attributes.keys().cloned().collect();
        Self {
            attributes: Mutex::new(attributes),
            names,
            behavior: Mutex::new(Behavior::Normal),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            notifier: Mutex::new(None),
        }
    }

    pub fn with_behavior(self, behavior: Behavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn attributes(&self) -> Attributes {
        lock(&self.attributes).clone()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Every attribute map passed to `set_attributes`, in call order.
    pub fn received(&self) -> Vec<Attributes> {
        lock(&self.received).clone()
    }

    pub fn attach_notifier(&self, notifier: AttributeNotifier) {
        *lock(&self.notifier) = Some(notifier);
    }

    /// Update attributes locally and publish the change.
    pub fn publish(&self, changed: Attributes) -> usize {
        lock(&self.attributes).extend(changed.clone());
        match lock(&self.notifier).as_ref() {
            Some(notifier) => notifier.publish(changed),
            None => 0,
        }
    }

    fn behave(&self, ctx: &RequestContext) -> Result<(), ContainerError> {
        let behavior = lock(&self.behavior).clone();
        match behavior {
            Behavior::Normal => Ok(()),
            Behavior::Delay(delay) => {
                std::thread::sleep(delay);
                Ok(())
            }
            Behavior::HangUntilCancelled => {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(ContainerError::Plugin("request cancelled".into()))
            }
            Behavior::Fail(message) => Err(ContainerError::Plugin(message)),
            Behavior::Panic => panic!("mock resource panicked"),
        }
    }
}

impl BundleResource for MockResource {
    fn attribute_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn get_attributes(&self, ctx: &RequestContext) -> Result<Attributes, ContainerError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.behave(ctx)?;
        Ok(self.attributes())
    }

    fn set_attributes(
        &self,
        attributes: Attributes,
        ctx: &RequestContext,
    ) -> Result<Attributes, ContainerError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        lock(&self.received).push(attributes.clone());
        self.behave(ctx)?;
        let mut current = lock(&self.attributes);
        current.extend(attributes);
        Ok(current.clone())
    }
}
