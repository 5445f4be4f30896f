//! Declarative patches for Kubernetes objects
//!
//! kubepatch is a provider that applies a JSON patch, a JSON merge patch or a strategic
//! merge patch to a single existing object, and tracks that patch as a resource.
//!
//! The crate re-exports the two halves it is built from:
//!
//! - [`core`]: resource kinds, patch types, schemas and diagnostics, with no client attached
//! - [`client`]: configuration resolution and the provider and resource lifecycles on top of [`kube`](https://docs.rs/kube)
//!
//! A host drives the provider through the line based [`server`].
//!
//! # Example
//!
//! ```no_run
//! use kubepatch::{KubePatchProvider, core::PatchResourceModel};
//! use serde_json::json;
//!
//! # async fn wrapper() -> anyhow::Result<()> {
//! let mut provider = KubePatchProvider::new(env!("CARGO_PKG_VERSION"));
//! let diagnostics = provider.configure(json!({"config_path": "~/.kube/config"})).await;
//! anyhow::ensure!(!diagnostics.has_error(), "configure failed: {diagnostics:?}");
//!
//! let response = provider
//!     .patch_resource()
//!     .create(PatchResourceModel {
//!         namespace: "default".into(),
//!         resource: "deployments".into(),
//!         name: "web".into(),
//!         patch_type: "merge".into(),
//!         data: r#"{"spec":{"replicas":3}}"#.into(),
//!         id: None,
//!     })
//!     .await;
//! println!("{:?}", response.state);
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

#[doc(inline)]
pub use kubepatch_core as core;

#[doc(inline)]
pub use kubepatch_client as client;

pub use kubepatch_client::{Error, KubePatchProvider, PatchResource};

pub mod server;
#[doc(inline)]
pub use server::{schemas, Server};
