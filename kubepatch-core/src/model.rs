//! Data models exchanged with the host
//!
//! These mirror the attributes of the provider and resource [`schema`](crate::schema)s.
//! Absent attributes and explicit `null`s both decode to `None` (or an empty list),
//! since the host sends every attribute of the schema whether it was set or not.
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

fn deserialize_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    let opt = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Provider level configuration: how to reach and authenticate against the cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// The hostname (in form of URI) of the Kubernetes API server
    pub host: Option<String>,
    /// Username for HTTP basic authentication
    pub username: Option<String>,
    /// Password for HTTP basic authentication
    pub password: Option<String>,
    /// Skip verification of the server certificate
    pub insecure: Option<bool>,
    /// Server name used for SNI and to check the server certificate against
    pub tls_server_name: Option<String>,
    /// PEM-encoded client certificate for TLS authentication
    pub client_certificate: Option<String>,
    /// PEM-encoded client certificate key for TLS authentication
    pub client_key: Option<String>,
    /// PEM-encoded root certificates bundle for TLS authentication
    pub cluster_ca_certificate: Option<String>,
    /// Kubeconfig files to merge, in order
    #[serde(deserialize_with = "deserialize_null_as_default")]
    pub config_paths: Vec<String>,
    /// A single kubeconfig file; takes precedence over `config_paths`
    pub config_path: Option<String>,
    /// Context to use from the kubeconfig
    pub config_context: Option<String>,
    /// User to use from the kubeconfig
    pub config_context_auth_info: Option<String>,
    /// Cluster to use from the kubeconfig
    pub config_context_cluster: Option<String>,
    /// Bearer token, typically of a service account
    pub token: Option<String>,
    /// Proxy used for all API requests
    pub proxy_url: Option<String>,
    /// Regular expressions of annotations managed by external systems
    #[serde(deserialize_with = "deserialize_null_as_default")]
    pub ignore_annotations: Vec<String>,
    /// Regular expressions of labels managed by external systems
    #[serde(deserialize_with = "deserialize_null_as_default")]
    pub ignore_labels: Vec<String>,
    /// Exec credential plugin; only the first block is used
    #[serde(deserialize_with = "deserialize_null_as_default")]
    pub exec: Vec<ExecSpec>,
    /// Experimental feature flags
    #[serde(deserialize_with = "deserialize_null_as_default")]
    pub experiments: Vec<ExperimentsSpec>,
}

impl ProviderConfig {
    /// Decode from the configuration object sent by the host
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(Error::InvalidModel)
    }
}

/// An `exec` block describing a client-go credential plugin
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSpec {
    /// Version of the `ExecCredential` API the plugin speaks
    pub api_version: String,
    /// Command to execute
    pub command: String,
    /// Extra environment for the command
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub env: BTreeMap<String, String>,
    /// Arguments for the command
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub args: Vec<String>,
}

/// An `experiments` block
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentsSpec {
    /// Deprecated and without effect
    #[serde(default)]
    pub manifest_resource: Option<bool>,
}

/// State and configuration of a `kubepatch_patch` resource
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResourceModel {
    /// Namespace of the patched object; ignored for cluster scoped kinds
    pub namespace: String,
    /// Plural resource name, e.g. `deployments`
    pub resource: String,
    /// Name of the patched object
    pub name: String,
    /// One of `json`, `merge`, `strategic`
    #[serde(rename = "type")]
    pub patch_type: String,
    /// The patch body
    pub data: String,
    /// Computed identifier; `None` until the first apply
    #[serde(default)]
    pub id: Option<String>,
}

impl PatchResourceModel {
    /// Decode from a plan or state object sent by the host
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(Error::InvalidModel)
    }

    /// Encode into a state object for the host
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "namespace": self.namespace,
            "resource": self.resource,
            "name": self.name,
            "type": self.patch_type,
            "data": self.data,
            "id": self.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_config_accepts_nulls_from_host() {
        let cfg = ProviderConfig::from_value(json!({
            "host": "https://10.0.0.1:6443",
            "config_paths": null,
            "exec": null,
            "insecure": null,
            "ignore_labels": ["^app\\.kubernetes\\.io/"],
        }))
        .unwrap();
        assert_eq!(cfg.host.as_deref(), Some("https://10.0.0.1:6443"));
        assert!(cfg.config_paths.is_empty());
        assert!(cfg.exec.is_empty());
        assert_eq!(cfg.insecure, None);
        assert_eq!(cfg.ignore_labels.len(), 1);
    }

    #[test]
    fn exec_block_decodes() {
        let cfg = ProviderConfig::from_value(json!({
            "exec": [{
                "api_version": "client.authentication.k8s.io/v1beta1",
                "command": "aws",
                "args": ["eks", "get-token", "--cluster-name", "prod"],
                "env": {"AWS_PROFILE": "ops"},
            }]
        }))
        .unwrap();
        let exec = &cfg.exec[0];
        assert_eq!(exec.command, "aws");
        assert_eq!(exec.args.len(), 4);
        assert_eq!(exec.env.get("AWS_PROFILE").map(String::as_str), Some("ops"));
    }

    #[test]
    fn patch_model_uses_type_attribute() {
        let model = PatchResourceModel::from_value(json!({
            "namespace": "default",
            "resource": "deployments",
            "name": "web",
            "type": "merge",
            "data": "{\"spec\":{\"replicas\":2}}",
        }))
        .unwrap();
        assert_eq!(model.patch_type, "merge");
        assert_eq!(model.id, None);
        assert_eq!(model.to_value()["type"], "merge");
        assert!(model.to_value()["id"].is_null());
    }
}
