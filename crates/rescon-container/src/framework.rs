// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process resource framework.
//!
//! Keeps attached handlers in a map so a host can route requests by uri
//! without a network server.

use std::collections::HashMap;
use std::sync::RwLock;

use rescon_core::{
    Attributes, ContainerError, QueryParams, RequestHandlers, ResourceDescriptor,
    ResourceFramework, StatusCode,
};

struct Attached {
    descriptor: ResourceDescriptor,
    handlers: RequestHandlers,
    notifications: u64,
}

/// Default [`ResourceFramework`] used when none is supplied.
#[derive(Default)]
pub struct LocalFramework {
    attached: RwLock<HashMap<String, Attached>>,
}

impl LocalFramework {
    pub fn new() -> Self {
        Self::default()
    }

    fn handlers(&self, uri: &str) -> Option<RequestHandlers> {
        self.attached
            .read()
            .ok()?
            .get(uri)
            .map(|a| a.handlers.clone())
    }

    /// Route a GET to the attached handlers. `None` if nothing is attached.
    pub async fn get(&self, uri: &str, query: QueryParams) -> Option<(Attributes, StatusCode)> {
        let handlers = self.handlers(uri)?;
        Some(handlers.get(query).await)
    }

    /// Route a SET to the attached handlers. `None` if nothing is attached.
    pub async fn set(
        &self,
        uri: &str,
        attributes: Attributes,
        query: QueryParams,
    ) -> Option<(Attributes, StatusCode)> {
        let handlers = self.handlers(uri)?;
        Some(handlers.set(attributes, query).await)
    }

    /// Attached uris, sorted.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .attached
            .read()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        uris.sort();
        uris
    }

    pub fn descriptor(&self, uri: &str) -> Option<ResourceDescriptor> {
        self.attached
            .read()
            .ok()?
            .get(uri)
            .map(|a| a.descriptor.clone())
    }

    /// Observer notifications delivered for `uri` since it was attached.
    pub fn notifications(&self, uri: &str) -> u64 {
        self.attached
            .read()
            .ok()
            .and_then(|a| a.get(uri).map(|a| a.notifications))
            .unwrap_or(0)
    }
}

impl ResourceFramework for LocalFramework {
    fn attach(
        &self,
        descriptor: &ResourceDescriptor,
        handlers: RequestHandlers,
    ) -> Result<(), ContainerError> {
        let mut attached = self.attached.write().map_err(ContainerError::poisoned)?;
        if attached.contains_key(&descriptor.uri) {
            return Err(ContainerError::resource_exists(&descriptor.uri));
        }
        attached.insert(
            descriptor.uri.clone(),
            Attached {
                descriptor: descriptor.clone(),
                handlers,
                notifications: 0,
            },
        );
        tracing::debug!(uri = %descriptor.uri, interface = %descriptor.interface, "handlers attached");
        Ok(())
    }

    fn detach(&self, uri: &str) -> Result<(), ContainerError> {
        self.attached
            .write()
            .map_err(ContainerError::poisoned)?
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| ContainerError::resource_not_found(uri))
    }

    fn notify(&self, uri: &str) {
        if let Ok(mut attached) = self.attached.write() {
            if let Some(entry) = attached.get_mut(uri) {
                entry.notifications += 1;
                tracing::trace!(uri, "observers notified");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn echo_handlers() -> RequestHandlers {
        RequestHandlers::new(
            |query: QueryParams| {
                async move {
                    let attrs = query
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    (attrs, StatusCode::Ok)
                }
                .boxed()
            },
            |attrs: Attributes, _query: QueryParams| async move { (attrs, StatusCode::Ok) }.boxed(),
        )
    }

    #[tokio::test]
    async fn attached_handlers_are_routable() {
        let framework = LocalFramework::new();
        let desc = ResourceDescriptor::new("/a", "oic.r.a", "b1");
        framework.attach(&desc, echo_handlers()).unwrap();

        let mut query = QueryParams::new();
        query.insert("rt".into(), "oic.r.a".into());
        let (attrs, status) = framework.get("/a", query).await.unwrap();
        assert_eq!(status, StatusCode::Ok);
        assert_eq!(attrs["rt"], serde_json::json!("oic.r.a"));
        assert!(framework.get("/b", QueryParams::new()).await.is_none());
        assert_eq!(framework.uris(), ["/a"]);
    }

    #[test]
    fn double_attach_is_rejected_and_detach_removes() {
        let framework = LocalFramework::new();
        let desc = ResourceDescriptor::new("/a", "oic.r.a", "b1");
        framework.attach(&desc, echo_handlers()).unwrap();
        assert!(framework.attach(&desc, echo_handlers()).unwrap_err().is_already_exists());
        framework.notify("/a");
        framework.notify("/a");
        assert_eq!(framework.notifications("/a"), 2);
        framework.detach("/a").unwrap();
        assert!(framework.detach("/a").unwrap_err().is_not_found());
        assert_eq!(framework.notifications("/a"), 0);
    }
}
