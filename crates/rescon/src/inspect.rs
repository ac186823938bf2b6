// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rescon check` and `rescon bundles`: descriptor inspection.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rescon_config::{ContainerConfig, Descriptors};
use rescon_container::Container;
use rescon_core::{BundleInfo, ContainerError};

/// Validate a descriptor file, rendering diagnostics. Returns whether it is valid.
pub fn check(path: &Path) -> bool {
    match rescon_config::load_descriptors(path) {
        Ok(descriptors) => {
            print!("{}", render(&descriptors));
            println!("{}", summary(&descriptors));
            true
        }
        Err(errors) => {
            rescon_config::render_errors(&errors);
            false
        }
    }
}

fn summary(descriptors: &Descriptors) -> String {
    let resources: usize = descriptors.bundles().iter().map(|b| b.resources.len()).sum();
    format!(
        "ok: {} bundle(s), {} resource(s)",
        descriptors.bundles().len(),
        resources
    )
}

/// Start a container from `path`, report what it hosts, then stop it.
pub async fn live_bundles(
    config: ContainerConfig,
    path: PathBuf,
) -> Result<String, ContainerError> {
    let container = Container::builder().config(config).build()?;
    let worker = container.clone();
    let report = tokio::task::spawn_blocking(move || {
        let started = worker.start(Some(path.as_path()));
        let report = started.and_then(|()| {
            let bundles = worker.list_bundles()?;
            Ok(render_live(&worker, &bundles))
        });
        worker.stop();
        report
    })
    .await
    .map_err(|e| ContainerError::Internal(format!("inspection task failed: {e}")))??;
    Ok(report)
}

fn render_live(container: &Container, bundles: &[BundleInfo]) -> String {
    let mut out = String::new();
    for info in bundles {
        let capabilities: Vec<String> = info.capabilities.iter().map(|c| c.to_string()).collect();
        let _ = writeln!(
            out,
            "{:<16} {:<8} {:<10} [{}]",
            info.id(),
            info.descriptor.kind,
            info.state,
            capabilities.join(",")
        );
        for uri in container.list_bundle_resources(info.id()) {
            let _ = writeln!(out, "  {uri}");
        }
    }
    out
}

fn render(descriptors: &Descriptors) -> String {
    let mut out = String::new();
    for bundle in descriptors.bundles() {
        let d = &bundle.descriptor;
        let version = if d.version.is_empty() {
            "-"
        } else {
            d.version.as_str()
        };
        let _ = writeln!(
            out,
            "{:<16} {:<8} {:<10} {}",
            d.id,
            d.kind,
            version,
            d.path.display()
        );
        for resource in &bundle.resources {
            let _ = writeln!(out, "  {} ({})", resource.uri, resource.resource_type);
            for input in &resource.inputs {
                let pattern = if input.uri_pattern.is_empty() {
                    "*"
                } else {
                    input.uri_pattern.as_str()
                };
                let _ = writeln!(
                    out,
                    "    <- {} [{}] {}",
                    pattern, input.resource_type, input.attribute_name
                );
            }
        }
    }
    out
}
