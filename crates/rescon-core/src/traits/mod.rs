// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions at the seams between the container, bundle code, and the
//! external resource-object framework.

pub mod framework;
pub mod resource;

pub use framework::{RequestHandlers, ResourceFramework};
pub use resource::{AttributeNotifier, BundleResource, RequestContext};
