//! Cluster access for the kubepatch provider
//!
//! This crate turns a [`ProviderConfig`](kubepatch_core::ProviderConfig) into a [`kube::Client`]
//! and applies declared patches through it:
//!
//! - [`config`] resolves kubeconfig files, context selection and static overrides once, at configure time
//! - [`dispatch`] maps each [`ResourceKind`](kubepatch_core::ResourceKind) to its typed [`Api`](kube::Api) call
//! - [`provider`] and [`resource`] implement the provider and `kubepatch_patch` lifecycles on top,
//!   reporting every failure as [`Diagnostics`](kubepatch_core::Diagnostics)
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod dispatch;

pub mod provider;
#[doc(inline)]
pub use provider::KubePatchProvider;

pub mod resource;
#[doc(inline)]
pub use resource::PatchResource;

pub mod error;
#[doc(inline)]
pub use error::Error;

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
