//! Types and traits for the kubepatch provider that do not need a Kubernetes client
//!
//! This crate holds the declarative side of the provider: the [`ResourceKind`] table,
//! the [`PatchType`]s a resource can declare, the provider and resource [`model`]s,
//! the [`schema`] used to validate configuration, and the [`Diagnostics`] handed back to the host.
//! The same information is re-exported from `kubepatch` under `kubepatch::core`.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod diagnostics;
pub use diagnostics::{AttributePath, Diagnostic, Diagnostics, Severity};

mod kind;
pub use kind::{ApiGroup, ResourceKind};

pub mod model;
pub use model::{ExecSpec, ExperimentsSpec, PatchResourceModel, ProviderConfig};

pub mod params;
pub use params::{PatchTarget, PatchType, ResourceId};

pub mod schema;
pub use schema::{Attribute, AttributeType, Block, PlanModifier, Schema, Validator};

mod error;
pub use error::Error;

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
