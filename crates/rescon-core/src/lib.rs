// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the rescon resource container.
//!
//! This crate provides the error taxonomy, the shared data model, and the
//! traits at the seams between the container, bundle code, and the external
//! resource-object framework.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ContainerError;
pub use types::{
    Attributes, BASELINE_INTERFACE, BundleDescriptor, BundleInfo, BundleKind, BundleState,
    EntryPointKind, InputBinding, Operation, Params, QueryParams, RegistryEvent, ResourceConfig,
    ResourceDescriptor, StatusCode,
};

pub use traits::{
    AttributeNotifier, BundleResource, RequestContext, RequestHandlers, ResourceFramework,
};
