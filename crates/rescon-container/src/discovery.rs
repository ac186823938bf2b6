// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input discovery for soft-sensor resources.
//!
//! A resource with input bindings gets one subscription. Each binding runs
//! as its own task: it searches the registry for a resource matching its uri
//! pattern and resource type, follows that resource's attribute changes, and
//! goes back to searching when the resource disappears. Every observed value
//! is applied to the output resource as a single-attribute SET.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::Regex;
use rescon_core::{
    Attributes, ContainerError, InputBinding, Operation, QueryParams, RegistryEvent,
    RequestContext, ResourceDescriptor,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::executor::{BoundedExecutor, Outcome};
use crate::resources::ResourceTable;

/// A uri pattern where `*` matches any run of characters.
///
/// An empty pattern matches every uri.
#[derive(Debug, Clone)]
pub struct UriPattern {
    regex: Option<Regex>,
}

impl UriPattern {
    pub fn new(pattern: &str) -> Result<Self, ContainerError> {
        if pattern.is_empty() {
            return Ok(Self { regex: None });
        }
        let body = regex::escape(pattern).replace(r"\*", ".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| ContainerError::Config(format!("invalid uri pattern `{pattern}`: {e}")))?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.regex.as_ref().is_none_or(|r| r.is_match(uri))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BindingState {
    Searching,
    Bound,
    Cancelled,
}

/// Point-in-time view of one input binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingSnapshot {
    pub uri_pattern: String,
    pub resource_type: String,
    pub attribute_name: String,
    pub state: BindingState,
    pub bound_uri: Option<String>,
}

struct BindingShared {
    output_uri: String,
    binding: InputBinding,
    pattern: UriPattern,
    status: Mutex<(BindingState, Option<String>)>,
}

impl BindingShared {
    fn accepts(&self, uri: &str, resource_type: &str) -> bool {
        uri != self.output_uri
            && self.pattern.matches(uri)
            && (self.binding.resource_type.is_empty() || self.binding.resource_type == resource_type)
    }

    fn bound_uri(&self) -> Option<String> {
        self.status.lock().ok().and_then(|s| s.1.clone())
    }

    fn is_searching(&self) -> bool {
        self.status
            .lock()
            .map(|s| s.0 == BindingState::Searching)
            .unwrap_or(false)
    }

    fn set(&self, state: BindingState, bound: Option<String>) {
        if let Ok(mut status) = self.status.lock() {
            *status = (state, bound);
        }
    }

    fn snapshot(&self) -> BindingSnapshot {
        let (state, bound_uri) = self
            .status
            .lock()
            .map(|s| (*s).clone())
            .unwrap_or((BindingState::Cancelled, None));
        BindingSnapshot {
            uri_pattern: self.binding.uri_pattern.clone(),
            resource_type: self.binding.resource_type.clone(),
            attribute_name: self.binding.attribute_name.clone(),
            state,
            bound_uri,
        }
    }
}

struct Subscription {
    cancel: CancellationToken,
    bindings: Vec<Arc<BindingShared>>,
    updates: mpsc::Sender<Attributes>,
}

/// Tracks input subscriptions of soft-sensor resources.
pub struct DiscoveryCoordinator {
    table: ResourceTable,
    events: broadcast::Sender<RegistryEvent>,
    executor: BoundedExecutor,
    update_buffer: usize,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl DiscoveryCoordinator {
    pub fn new(
        table: ResourceTable,
        events: broadcast::Sender<RegistryEvent>,
        executor: BoundedExecutor,
        update_buffer: usize,
    ) -> Self {
        Self {
            table,
            events,
            executor,
            update_buffer: update_buffer.max(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Start discovery for every input binding of `output`.
    ///
    /// Bindings accumulate when called again for the same output uri.
    pub fn start_subscription(&self, output: &ResourceDescriptor) {
        let Ok(mut subscriptions) = self.subscriptions.lock() else {
            tracing::error!(uri = %output.uri, "discovery state poisoned");
            return;
        };
        let subscription = subscriptions.entry(output.uri.clone()).or_insert_with(|| {
            let cancel = CancellationToken::new();
            let (updates, rx) = mpsc::channel(self.update_buffer);
            self.executor.handle().spawn(apply_updates(
                self.table.clone(),
                self.executor.clone(),
                output.uri.clone(),
                rx,
                cancel.clone(),
            ));
            Subscription {
                cancel,
                bindings: Vec::new(),
                updates,
            }
        });

        for binding in &output.inputs {
            let pattern = match UriPattern::new(&binding.uri_pattern) {
                Ok(pattern) => pattern,
                Err(e) => {
                    tracing::warn!(uri = %output.uri, error = %e, "input binding skipped");
                    continue;
                }
            };
            let shared = Arc::new(BindingShared {
                output_uri: output.uri.clone(),
                binding: binding.clone(),
                pattern,
                status: Mutex::new((BindingState::Searching, None)),
            });
            // Subscribe before the task starts so no registration between the
            // initial scan and the first recv is missed.
            let events = self.events.subscribe();
            self.executor.handle().spawn(run_binding(
                Arc::clone(&shared),
                self.table.clone(),
                self.executor.clone(),
                events,
                subscription.updates.clone(),
                subscription.cancel.child_token(),
            ));
            tracing::debug!(
                uri = %output.uri,
                pattern = %binding.uri_pattern,
                resource_type = %binding.resource_type,
                attribute = %binding.attribute_name,
                "input binding started"
            );
            subscription.bindings.push(shared);
        }
    }

    /// Cancel every binding of `output_uri`. Returns whether a subscription existed.
    pub fn stop_subscription(&self, output_uri: &str) -> bool {
        let removed = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|mut s| s.remove(output_uri));
        match removed {
            Some(subscription) => {
                subscription.cancel.cancel();
                for binding in &subscription.bindings {
                    binding.set(BindingState::Cancelled, None);
                }
                tracing::debug!(uri = %output_uri, "discovery stopped");
                true
            }
            None => false,
        }
    }

    /// Cancel all subscriptions.
    pub fn stop_all(&self) {
        let uris: Vec<String> = self
            .subscriptions
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        for uri in uris {
            self.stop_subscription(&uri);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Current state of every binding of `output_uri`, in declaration order.
    pub fn bindings(&self, output_uri: &str) -> Vec<BindingSnapshot> {
        self.subscriptions
            .lock()
            .ok()
            .and_then(|s| {
                s.get(output_uri)
                    .map(|sub| sub.bindings.iter().map(|b| b.snapshot()).collect())
            })
            .unwrap_or_default()
    }
}

impl Drop for DiscoveryCoordinator {
    fn drop(&mut self) {
        if let Ok(subscriptions) = self.subscriptions.get_mut() {
            for subscription in subscriptions.values() {
                subscription.cancel.cancel();
            }
        }
    }
}

/// Apply forwarded input values to the output resource, one at a time.
async fn apply_updates(
    table: ResourceTable,
    executor: BoundedExecutor,
    output_uri: String,
    mut updates: mpsc::Receiver<Attributes>,
    cancel: CancellationToken,
) {
    loop {
        let attributes = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = updates.recv() => match next {
                Some(attributes) => attributes,
                None => break,
            },
        };
        let Some(resource) = table.resource(&output_uri) else {
            tracing::debug!(uri = %output_uri, "output resource gone; input dropped");
            continue;
        };
        let outcome = executor
            .run(Operation::Set, &output_uri, move |token| {
                let ctx = RequestContext::new(QueryParams::new(), token);
                resource.set_attributes(attributes, &ctx)
            })
            .await;
        match outcome {
            Outcome::Completed(_) => {
                tracing::trace!(uri = %output_uri, "input applied");
            }
            Outcome::Failed(e) => {
                tracing::warn!(uri = %output_uri, error = %e, "applying input failed");
            }
            Outcome::TimedOut => {}
        }
    }
}

struct BindingTask {
    shared: Arc<BindingShared>,
    table: ResourceTable,
    executor: BoundedExecutor,
    updates: mpsc::Sender<Attributes>,
    cancel: CancellationToken,
}

impl BindingTask {
    /// Bind to the first matching resource in uri order, if any.
    async fn scan(&self) {
        let found = self
            .table
            .snapshot()
            .into_iter()
            .find(|d| self.shared.accepts(&d.uri, &d.resource_type));
        if let Some(descriptor) = found {
            self.bind(descriptor.uri).await;
        }
    }

    async fn bind(&self, uri: String) {
        self.shared.set(BindingState::Bound, Some(uri.clone()));
        tracing::debug!(
            output = %self.shared.output_uri,
            input = %uri,
            attribute = %self.shared.binding.attribute_name,
            "input bound"
        );

        let Some(resource) = self.table.resource(&uri) else {
            return;
        };
        let outcome = self
            .executor
            .run(Operation::Get, &uri, move |token| {
                resource.get_attributes(&RequestContext::new(QueryParams::new(), token))
            })
            .await;
        if let Outcome::Completed(attributes) = outcome {
            self.forward(&attributes).await;
        }
    }

    fn unbind(&self) {
        self.shared.set(BindingState::Searching, None);
        tracing::debug!(output = %self.shared.output_uri, "input lost; searching");
    }

    async fn forward(&self, attributes: &Attributes) {
        let name = &self.shared.binding.attribute_name;
        let Some(value) = attributes.get(name) else {
            return;
        };
        let mut update = Attributes::new();
        update.insert(name.clone(), value.clone());
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.updates.send(update) => {}
        }
    }

    async fn handle(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::Registered { uri, resource_type } => {
                if self.shared.is_searching() && self.shared.accepts(&uri, &resource_type) {
                    self.bind(uri).await;
                }
            }
            RegistryEvent::Unregistered { uri } => {
                if self.shared.bound_uri().as_deref() == Some(uri.as_str()) {
                    self.unbind();
                    self.scan().await;
                }
            }
            RegistryEvent::AttributesChanged { uri, attributes } => {
                if self.shared.bound_uri().as_deref() == Some(uri.as_str()) {
                    self.forward(&attributes).await;
                }
            }
        }
    }

    /// Resynchronise with the table after missed events.
    async fn resync(&self) {
        if let Some(bound) = self.shared.bound_uri() {
            if self.table.contains(&bound) {
                return;
            }
            self.unbind();
        }
        self.scan().await;
    }
}

async fn run_binding(
    shared: Arc<BindingShared>,
    table: ResourceTable,
    executor: BoundedExecutor,
    mut events: broadcast::Receiver<RegistryEvent>,
    updates: mpsc::Sender<Attributes>,
    cancel: CancellationToken,
) {
    let task = BindingTask {
        shared,
        table,
        executor,
        updates,
        cancel,
    };
    task.scan().await;

    loop {
        let event = tokio::select! {
            biased;
            _ = task.cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) => task.handle(event).await,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(
                    output = %task.shared.output_uri,
                    missed,
                    "discovery lagged behind registry events"
                );
                task.resync().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    task.shared.set(BindingState::Cancelled, None);
}
