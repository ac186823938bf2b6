// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes GET and SET requests to registered resources.

use std::time::Instant;

use rescon_core::{Attributes, Operation, QueryParams, RequestContext, StatusCode};

use crate::executor::{BoundedExecutor, Outcome};
use crate::recording;
use crate::resources::ResourceTable;

/// Dispatches requests on bounded workers.
///
/// An unknown uri yields `NotFound`. A handler that fails, panics or runs past
/// the timeout yields `Ok` with an empty attribute map; the failure is logged
/// and counted but never reaches the requester.
#[derive(Clone)]
pub struct RequestDispatcher {
    table: ResourceTable,
    executor: BoundedExecutor,
}

impl RequestDispatcher {
    pub fn new(table: ResourceTable, executor: BoundedExecutor) -> Self {
        Self { table, executor }
    }

    pub async fn dispatch(
        &self,
        uri: &str,
        op: Operation,
        query: QueryParams,
        attributes: Attributes,
    ) -> (Attributes, StatusCode) {
        let started = Instant::now();
        let Some(resource) = self.table.resource(uri) else {
            tracing::debug!(%uri, %op, "request for unknown resource");
            recording::record_dispatch(op, "not_found", started.elapsed());
            return (Attributes::new(), StatusCode::NotFound);
        };

        let outcome = self
            .executor
            .run(op, uri, move |token| {
                let ctx = RequestContext::new(query, token);
                match op {
                    Operation::Get => resource.get_attributes(&ctx),
                    Operation::Set => {
                        let names = resource.attribute_names();
                        let mut attributes = attributes;
                        attributes.retain(|name, _| names.contains(name));
                        resource.set_attributes(attributes, &ctx)
                    }
                }
            })
            .await;
        recording::record_dispatch(op, outcome.label(), started.elapsed());

        match outcome {
            Outcome::Completed(attributes) => {
                tracing::trace!(%uri, %op, "request served");
                (attributes, StatusCode::Ok)
            }
            Outcome::Failed(e) => {
                tracing::warn!(%uri, %op, error = %e, "resource handler failed");
                (Attributes::new(), StatusCode::Ok)
            }
            Outcome::TimedOut => (Attributes::new(), StatusCode::Ok),
        }
    }

    pub async fn get(&self, uri: &str, query: QueryParams) -> (Attributes, StatusCode) {
        self.dispatch(uri, Operation::Get, query, Attributes::new())
            .await
    }

    pub async fn set(
        &self,
        uri: &str,
        query: QueryParams,
        attributes: Attributes,
    ) -> (Attributes, StatusCode) {
        self.dispatch(uri, Operation::Set, query, attributes).await
    }
}
