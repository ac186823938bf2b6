// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording resource framework.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rescon_core::{ContainerError, RequestHandlers, ResourceDescriptor, ResourceFramework};

use crate::lock;

/// A [`ResourceFramework`] that keeps attached handlers and counts every call.
#[derive(Default)]
pub struct MockFramework {
    attached: Mutex<HashMap<String, (ResourceDescriptor, RequestHandlers)>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    notified: Mutex<Vec<String>>,
}

impl MockFramework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handlers(&self, uri: &str) -> Option<RequestHandlers> {
        lock(&self.attached).get(uri).map(|(_, h)| h.clone())
    }

    pub fn descriptor(&self, uri: &str) -> Option<ResourceDescriptor> {
        lock(&self.attached).get(uri).map(|(d, _)| d.clone())
    }

    /// Attached uris, sorted.
    pub fn attached_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = lock(&self.attached).keys().cloned().collect();
        uris.sort();
        uris
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    /// Number of observer notifications sent for `uri`.
    pub fn notifications(&self, uri: &str) -> usize {
        lock(&self.notified).iter().filter(|u| *u == uri).count()
    }
}

impl ResourceFramework for MockFramework {
    fn attach(
        &self,
        descriptor: &ResourceDescriptor,
        handlers: RequestHandlers,
    ) -> Result<(), ContainerError> {
        let mut attached = lock(&self.attached);
        if attached.contains_key(&descriptor.uri) {
            return Err(ContainerError::resource_exists(&descriptor.uri));
        }
        attached.insert(descriptor.uri.clone(), (descriptor.clone(), handlers));
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self, uri: &str) -> Result<(), ContainerError> {
        lock(&self.attached)
            .remove(uri)
            .ok_or_else(|| ContainerError::resource_not_found(uri))?;
        self.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn notify(&self, uri: &str) {
        lock(&self.notified).push(uri.to_string());
    }
}
