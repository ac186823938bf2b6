// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary to the external resource-object framework that receives network
//! requests and routes them into the container.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ContainerError;
use crate::types::{Attributes, QueryParams, ResourceDescriptor, StatusCode};

type GetFn = dyn Fn(QueryParams) -> BoxFuture<'static, (Attributes, StatusCode)> + Send + Sync;
type SetFn =
    dyn Fn(Attributes, QueryParams) -> BoxFuture<'static, (Attributes, StatusCode)> + Send + Sync;

/// The GET and SET callbacks installed for one resource.
#[derive(Clone)]
pub struct RequestHandlers {
    get: Arc<GetFn>,
    set: Arc<SetFn>,
}

impl RequestHandlers {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(QueryParams) -> BoxFuture<'static, (Attributes, StatusCode)> + Send + Sync + 'static,
        S: Fn(Attributes, QueryParams) -> BoxFuture<'static, (Attributes, StatusCode)>
            + Send
            + Sync
            + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    pub async fn get(&self, query: QueryParams) -> (Attributes, StatusCode) {
        (self.get)(query).await
    }

    pub async fn set(&self, attributes: Attributes, query: QueryParams) -> (Attributes, StatusCode) {
        (self.set)(attributes, query).await
    }
}

impl fmt::Debug for RequestHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandlers").finish_non_exhaustive()
    }
}

/// The external resource-object framework.
///
/// The container attaches handlers when a resource is registered and detaches
/// them on unregistration. `notify` signals observers that a resource's
/// attributes changed.
pub trait ResourceFramework: Send + Sync + 'static {
    fn attach(
        &self,
        descriptor: &ResourceDescriptor,
        handlers: RequestHandlers,
    ) -> Result<(), ContainerError>;

    fn detach(&self, uri: &str) -> Result<(), ContainerError>;

    fn notify(&self, uri: &str);
}
