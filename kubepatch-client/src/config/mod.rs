//! Resolution of a [`ProviderConfig`] into a [`kube::Config`]
//!
//! Resolution happens once, when the provider is configured:
//! kubeconfig files are located and merged, the context selection is applied,
//! and every attribute set on the provider overrides what the files say.
//! Without files or a host, in-cluster configuration is used, with the same overrides on top.
//!
//! Failures are reported as [`Diagnostics`] rather than errors,
//! since an invalid configuration should only fail the operations that need a client.
mod overrides;
mod paths;

pub use overrides::{default_server_url, ConfigOverrides, SYNTHETIC_NAME};
pub use paths::{config_paths, expand_home, load_kubeconfig, KUBE_CONFIG_PATHS};

use std::ffi::OsString;

use kube::{config::Kubeconfig, Config};
use kubepatch_core::{AttributePath, Diagnostic, Diagnostics, ProviderConfig};
use regex::Regex;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Summary of the warning emitted when no client configuration could be built
pub const INVALID_CONFIGURATION: &str =
    "Provider was supplied an invalid configuration. Further operations likely to fail.";

/// Outcome of [`resolve`]
#[derive(Debug, Default)]
pub struct Resolution {
    /// The client configuration, if one could be built
    pub config: Option<Config>,
    /// Problems found along the way
    pub diagnostics: Diagnostics,
}

/// Resolve the client configuration, reading `KUBE_CONFIG_PATHS` from the process environment
pub async fn resolve(config: &ProviderConfig) -> Resolution {
    resolve_with_env(config, std::env::var_os(KUBE_CONFIG_PATHS)).await
}

/// Resolve the client configuration with an explicit `KUBE_CONFIG_PATHS` value
pub async fn resolve_with_env(config: &ProviderConfig, kube_config_paths: Option<OsString>) -> Resolution {
    let mut diagnostics = check_patterns(config);
    let config = match build(config, kube_config_paths).await {
        Ok(config) => Some(config),
        Err(Error::InvalidHost { host, source }) => {
            diagnostics.push(
                Diagnostic::error(format!("Failed to parse value for host: {host}"), source.to_string())
                    .with_attribute(AttributePath::root("host")),
            );
            None
        }
        Err(err) => {
            warn!("{INVALID_CONFIGURATION} {err}");
            diagnostics.add_warning(INVALID_CONFIGURATION, err.to_string());
            None
        }
    };
    Resolution { config, diagnostics }
}

async fn build(config: &ProviderConfig, kube_config_paths: Option<OsString>) -> Result<Config> {
    let paths = config_paths(config, kube_config_paths)
        .iter()
        .map(|p| expand_home(p))
        .collect::<Result<Vec<_>>>()?;
    let has_host = config.host.as_deref().is_some_and(|h| !h.is_empty());
    let overrides = ConfigOverrides::new(config, !paths.is_empty())?;
    if paths.is_empty() && !has_host {
        debug!("No kubeconfig or host set, using in-cluster config");
        let mut incluster = Config::incluster().map_err(Error::InCluster)?;
        overrides.apply_to_config(&mut incluster)?;
        return Ok(incluster);
    }

    let mut kubeconfig = if paths.is_empty() {
        Kubeconfig::default()
    } else {
        load_kubeconfig(&paths)?
    };
    let options = overrides.apply(&mut kubeconfig)?;
    Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(Error::Kubeconfig)
}

/// Check that every `ignore_annotations` and `ignore_labels` entry is a valid regular expression
pub fn check_patterns(config: &ProviderConfig) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    for (attribute, patterns) in [
        ("ignore_annotations", &config.ignore_annotations),
        ("ignore_labels", &config.ignore_labels),
    ] {
        for (i, pattern) in patterns.iter().enumerate() {
            if let Err(source) = Regex::new(pattern) {
                let err = Error::InvalidPattern {
                    attribute,
                    pattern: pattern.clone(),
                    source,
                };
                diagnostics.push(
                    Diagnostic::error("Invalid regular expression", err.to_string())
                        .with_attribute(AttributePath::root(attribute).index(i)),
                );
            }
        }
    }
    diagnostics
}
