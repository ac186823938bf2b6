// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rescon run`: host bundles until a shutdown signal arrives.

use std::path::PathBuf;

use rescon_config::ContainerConfig;
use rescon_container::{Container, recording};
use rescon_core::ContainerError;
use tracing::info;

use crate::shutdown::install_signal_handler;

pub async fn run(
    config: ContainerConfig,
    descriptors: Option<PathBuf>,
) -> Result<(), ContainerError> {
    recording::register_metrics();

    let container = Container::builder().config(config).build()?;
    let starter = container.clone();
    tokio::task::spawn_blocking(move || starter.start(descriptors.as_deref()))
        .await
        .map_err(|e| ContainerError::Internal(format!("start task failed: {e}")))??;

    let bundles = container.list_bundles()?;
    info!(
        bundles = bundles.len(),
        resources = container.resource_count(),
        "rescon running"
    );

    let shutdown = install_signal_handler();
    shutdown.cancelled().await;

    // Bundle entry points are synchronous and may block.
    let stopper = container.clone();
    tokio::task::spawn_blocking(move || stopper.stop())
        .await
        .map_err(|e| ContainerError::Internal(format!("stop task failed: {e}")))?;
    info!("rescon stopped");
    Ok(())
}
