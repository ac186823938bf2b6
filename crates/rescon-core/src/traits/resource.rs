// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The resource trait implemented by bundle code, and the per-resource
//! notification channel handed back on registration.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::ContainerError;
use crate::types::{Attributes, QueryParams, RegistryEvent};

/// Per-request context passed into resource handlers.
///
/// Handlers run on a blocking worker. When the dispatcher gives up on a
/// request the token is cancelled; long-running handlers should poll
/// [`RequestContext::is_cancelled`] and return early.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    query: QueryParams,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(query: QueryParams, cancel: CancellationToken) -> Self {
        Self { query, cancel }
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// An addressable resource implemented by a bundle.
///
/// Calls are synchronous and may block; the dispatcher always invokes them
/// off the async runtime under a timeout.
pub trait BundleResource: Send + Sync + 'static {
    /// Names of the attributes this resource exposes. SET requests are
    /// filtered to these names before reaching [`BundleResource::set_attributes`].
    fn attribute_names(&self) -> Vec<String>;

    /// Produce the current attribute set.
    fn get_attributes(&self, ctx: &RequestContext) -> Result<Attributes, ContainerError>;

    /// Apply `attributes` and return the resulting attribute set.
    fn set_attributes(
        &self,
        attributes: Attributes,
        ctx: &RequestContext,
    ) -> Result<Attributes, ContainerError>;
}

/// Publishing side of a resource's change channel.
///
/// Returned to the bundle when its resource is registered. Bundles call
/// [`AttributeNotifier::publish`] whenever attribute values change; the
/// container forwards the event to observers and discovery bindings.
///
/// A notifier is bound to one registration. Once that registration ends the
/// notifier is revoked and publishes nothing, even if the uri is registered
/// again.
#[derive(Debug, Clone)]
pub struct AttributeNotifier {
    uri: String,
    events: broadcast::Sender<RegistryEvent>,
    registration: CancellationToken,
}

impl AttributeNotifier {
    pub fn new(uri: impl Into<String>, events: broadcast::Sender<RegistryEvent>) -> Self {
        Self::for_registration(uri, events, CancellationToken::new())
    }

    /// A notifier that stops publishing once `registration` is cancelled.
    pub fn for_registration(
        uri: impl Into<String>,
        events: broadcast::Sender<RegistryEvent>,
        registration: CancellationToken,
    ) -> Self {
        Self {
            uri: uri.into(),
            events,
            registration,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_revoked(&self) -> bool {
        self.registration.is_cancelled()
    }

    /// Publish changed attributes. Returns the number of live subscribers;
    /// zero is not an error. A revoked notifier always returns zero.
    pub fn publish(&self, attributes: Attributes) -> usize {
        if self.is_revoked() {
            tracing::debug!(uri = %self.uri, "publish through a revoked notifier ignored");
            return 0;
        }
        let event = RegistryEvent::AttributesChanged {
            uri: self.uri.clone(),
            attributes,
        };
        match self.events.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(uri = %self.uri, "attribute change published with no subscribers");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_publishes_attribute_changes() {
        let (tx, mut rx) = broadcast::channel(4);
        let notifier = AttributeNotifier::new("/res/temp", tx);

        let mut attrs = Attributes::new();
        attrs.insert("temperature".into(), serde_json::json!(21.5));
        assert_eq!(notifier.publish(attrs.clone()), 1);

        match rx.try_recv().expect("event should be queued") {
            RegistryEvent::AttributesChanged { uri, attributes } => {
                assert_eq!(uri, "/res/temp");
                assert_eq!(attributes, attrs);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let notifier = AttributeNotifier::new("/res/temp", tx);
        assert_eq!(notifier.publish(Attributes::new()), 0);
    }

    #[test]
    fn revoked_notifier_publishes_nothing() {
        let (tx, mut rx) = broadcast::channel(4);
        let registration = CancellationToken::new();
        let notifier = AttributeNotifier::for_registration("/x", tx, registration.clone());
        assert!(!notifier.is_revoked());

        registration.cancel();
        assert!(notifier.is_revoked());
        assert_eq!(notifier.publish(Attributes::new()), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn request_context_reports_cancellation() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(QueryParams::new(), token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
