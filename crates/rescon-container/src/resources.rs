// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource registry: uri-keyed resources, their owning bundles, and the
//! change events other components subscribe to.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use rescon_core::{
    AttributeNotifier, BundleResource, ContainerError, RegistryEvent, RequestHandlers,
    ResourceDescriptor, ResourceFramework,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::discovery::DiscoveryCoordinator;
use crate::recording;

/// A registered resource.
#[derive(Clone)]
pub struct ResourceEntry {
    pub descriptor: ResourceDescriptor,
    pub resource: Arc<dyn BundleResource>,
    /// Cancelled when this registration ends; revokes its notifier.
    registration: CancellationToken,
}

impl std::fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Tables {
    resources: HashMap<String, ResourceEntry>,
    by_bundle: HashMap<String, BTreeSet<String>>,
}

/// Shared read view of the registered resources.
///
/// Cloning is cheap; all clones see the same table.
#[derive(Clone, Default)]
pub struct ResourceTable {
    inner: Arc<RwLock<Tables>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, uri: &str) -> Option<ResourceEntry> {
        self.inner.read().ok()?.resources.get(uri).cloned()
    }

    pub fn resource(&self, uri: &str) -> Option<Arc<dyn BundleResource>> {
        self.lookup(uri).map(|e| e.resource)
    }

    pub fn descriptor(&self, uri: &str) -> Option<ResourceDescriptor> {
        self.lookup(uri).map(|e| e.descriptor)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.inner
            .read()
            .map(|t| t.resources.contains_key(uri))
            .unwrap_or(false)
    }

    /// Bundle that owns `uri`.
    pub fn owner(&self, uri: &str) -> Option<String> {
        self.descriptor(uri).map(|d| d.bundle_id)
    }

    /// Descriptors of every resource, sorted by uri.
    pub fn snapshot(&self) -> Vec<ResourceDescriptor> {
        let mut all: Vec<ResourceDescriptor> = self
            .inner
            .read()
            .map(|t| t.resources.values().map(|e| e.descriptor.clone()).collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.uri.cmp(&b.uri));
        all
    }

    /// Uris registered by `bundle_id`, sorted.
    pub fn bundle_resources(&self, bundle_id: &str) -> Vec<String> {
        self.inner
            .read()
            .ok()
            .and_then(|t| t.by_bundle.get(bundle_id).map(|s| s.iter().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|t| t.resources.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns registration and unregistration of resources.
///
/// Registrations and unregistrations are serialized as a whole, so the
/// table, the published events and the discovery subscriptions always agree
/// about which resources exist.
pub struct ResourceRegistry {
    table: ResourceTable,
    framework: Arc<dyn ResourceFramework>,
    discovery: Arc<DiscoveryCoordinator>,
    events: broadcast::Sender<RegistryEvent>,
    mutations: Mutex<()>,
}

impl ResourceRegistry {
    pub fn new(
        table: ResourceTable,
        framework: Arc<dyn ResourceFramework>,
        discovery: Arc<DiscoveryCoordinator>,
        events: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            table,
            framework,
            discovery,
            events,
            mutations: Mutex::new(()),
        }
    }

    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register a resource and attach its handlers to the framework.
    ///
    /// A duplicate uri is rejected without touching the existing entry or its
    /// attached handlers. Resources with input bindings start a discovery
    /// subscription.
    pub fn register(
        &self,
        descriptor: ResourceDescriptor,
        resource: Arc<dyn BundleResource>,
        handlers: RequestHandlers,
    ) -> Result<AttributeNotifier, ContainerError> {
        let _serial = self.mutations.lock().map_err(ContainerError::poisoned)?;
        let registration = CancellationToken::new();
        let count = {
            let mut tables = self.table.inner.write().map_err(ContainerError::poisoned)?;
            if tables.resources.contains_key(&descriptor.uri) {
                tracing::warn!(uri = %descriptor.uri, "resource already registered");
                return Err(ContainerError::resource_exists(&descriptor.uri));
            }
            self.framework.attach(&descriptor, handlers)?;
            tables
                .by_bundle
                .entry(descriptor.bundle_id.clone())
                .or_default()
                .insert(descriptor.uri.clone());
            tables.resources.insert(
                descriptor.uri.clone(),
                ResourceEntry {
                    descriptor: descriptor.clone(),
                    resource,
                    registration: registration.clone(),
                },
            );
            tables.resources.len()
        };
        recording::set_resources_registered(count);

        let _ = self.events.send(RegistryEvent::Registered {
            uri: descriptor.uri.clone(),
            resource_type: descriptor.resource_type.clone(),
        });
        if descriptor.has_inputs() {
            self.discovery.start_subscription(&descriptor);
        }

        tracing::info!(
            uri = %descriptor.uri,
            resource_type = %descriptor.resource_type,
            bundle_id = %descriptor.bundle_id,
            "resource registered"
        );
        Ok(AttributeNotifier::for_registration(
            descriptor.uri,
            self.events.clone(),
            registration,
        ))
    }

    /// Remove a resource, detach its handlers and stop its discovery.
    ///
    /// The removed entry is returned so the caller drops the resource outside
    /// any registry lock.
    pub fn unregister(&self, uri: &str) -> Result<ResourceEntry, ContainerError> {
        let _serial = self.mutations.lock().map_err(ContainerError::poisoned)?;
        self.discovery.stop_subscription(uri);

        let (entry, count) = {
            let mut tables = self.table.inner.write().map_err(ContainerError::poisoned)?;
            let entry = tables
                .resources
                .remove(uri)
                .ok_or_else(|| ContainerError::resource_not_found(uri))?;
            entry.registration.cancel();
            let bundle_id = &entry.descriptor.bundle_id;
            let now_empty = tables.by_bundle.get_mut(bundle_id).is_some_and(|uris| {
                uris.remove(uri);
                uris.is_empty()
            });
            if now_empty {
                tables.by_bundle.remove(bundle_id);
            }
            if let Err(e) = self.framework.detach(uri) {
                tracing::warn!(%uri, error = %e, "framework detach failed");
            }
            (entry, tables.resources.len())
        };
        recording::set_resources_registered(count);

        let _ = self.events.send(RegistryEvent::Unregistered {
            uri: uri.to_string(),
        });
        tracing::info!(%uri, bundle_id = %entry.descriptor.bundle_id, "resource unregistered");
        Ok(entry)
    }

    /// Unregister `uri` only if `bundle_id` owns it.
    pub fn unregister_owned(
        &self,
        bundle_id: &str,
        uri: &str,
    ) -> Result<ResourceEntry, ContainerError> {
        match self.table.owner(uri) {
            Some(owner) if owner == bundle_id => self.unregister(uri),
            _ => Err(ContainerError::resource_not_found(uri)),
        }
    }

    /// Unregister every resource of a bundle. Returns the removed uris.
    pub fn release_bundle(&self, bundle_id: &str) -> Vec<String> {
        self.table
            .bundle_resources(bundle_id)
            .into_iter()
            .filter(|uri| self.unregister(uri).is_ok())
            .collect()
    }

    /// Unregister everything. Returns the number of removed resources.
    pub fn clear(&self) -> usize {
        self.table
            .snapshot()
            .into_iter()
            .filter(|d| self.unregister(&d.uri).is_ok())
            .count()
    }
}
