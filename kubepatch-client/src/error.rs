//! Error handling in [`kubepatch_client`][crate]
use std::path::PathBuf;

use kube::config::{InClusterError, KubeconfigError};
use kubepatch_core::ResourceKind;
use thiserror::Error;

/// Possible errors when configuring the provider or patching objects
#[derive(Error, Debug)]
pub enum Error {
    /// A kubeconfig file could not be read, merged or interpreted
    #[error("Error loading kubeconfig: {0}")]
    Kubeconfig(#[source] KubeconfigError),

    /// In-cluster configuration was attempted and failed
    #[error("Unable to load in-cluster config: {0}")]
    InCluster(#[source] InClusterError),

    /// A kubeconfig path starting with `~` while no home directory is known
    #[error("Unable to expand {0:?}: home directory not found")]
    HomeDir(PathBuf),

    /// The `host` attribute is not a usable URL
    #[error("Invalid host {host:?}: {source}")]
    InvalidHost {
        /// The configured host
        host: String,
        /// Why it failed to parse
        #[source]
        source: http::uri::InvalidUri,
    },

    /// `cluster_ca_certificate` is not PEM
    #[error("Failed to parse cluster_ca_certificate: {0}")]
    Certificates(#[source] pem::PemError),

    /// `proxy_url` is not a usable URL
    #[error("Invalid proxy_url {url:?}: {source}")]
    InvalidProxyUrl {
        /// The configured proxy url
        url: String,
        /// Why it failed to parse
        #[source]
        source: http::uri::InvalidUri,
    },

    /// An `ignore_annotations` or `ignore_labels` entry is not a regular expression
    #[error("Invalid regular expression {pattern:?} in {attribute}: {source}")]
    InvalidPattern {
        /// The attribute holding the pattern
        attribute: &'static str,
        /// The pattern itself
        pattern: String,
        /// Why it failed to compile
        #[source]
        source: regex::Error,
    },

    /// The resolved configuration could not produce a client
    #[error("Failed to create client: {0}")]
    Client(#[source] kube::Error),

    /// The API server rejected the patch, or could not be reached
    #[error("failed to patch {kind} {name}: {source}")]
    Patch {
        /// Kind of the patched object
        kind: ResourceKind,
        /// Name of the patched object
        name: String,
        /// The client error
        #[source]
        source: kube::Error,
    },

    /// Looking up a patched object failed
    #[error("failed to get {kind} {name}: {source}")]
    Get {
        /// Kind of the object
        kind: ResourceKind,
        /// Name of the object
        name: String,
        /// The client error
        #[source]
        source: kube::Error,
    },

    /// The kind is accepted by the schema but has no patch endpoint
    #[error("{0} cannot be patched")]
    UnsupportedKind(ResourceKind),

    /// A resource operation ran before the provider was configured
    #[error("Unconfigured client")]
    Unconfigured,

    /// Invalid resource or provider input
    #[error(transparent)]
    Core(#[from] kubepatch_core::Error),
}
