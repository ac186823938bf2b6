// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource container.
//!
//! [`Container`] hosts bundles, keeps the registry of the resources they
//! register, dispatches GET/SET requests to those resources under a timeout
//! and wires soft-sensor inputs to the resources they are discovered from.

pub mod container;
pub mod discovery;
pub mod dispatcher;
pub mod executor;
pub mod framework;
pub mod recording;
pub mod resources;

pub use container::{Container, ContainerBuilder, LIBRARY_PATH_PARAM};
pub use discovery::{BindingSnapshot, BindingState, DiscoveryCoordinator, UriPattern};
pub use dispatcher::RequestDispatcher;
pub use executor::{BoundedExecutor, Outcome};
pub use framework::LocalFramework;
pub use resources::{ResourceEntry, ResourceRegistry, ResourceTable};
