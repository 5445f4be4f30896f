//! The provider: configuration, schema and resource registry
use kube::Client;
use kubepatch_core::{schema, Diagnostic, Diagnostics, ProviderConfig, Schema};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::{self, Resolution},
    PatchResource,
};

/// Type name the provider registers under
pub const PROVIDER_TYPE_NAME: &str = "kubepatch";

/// Type name of the patch resource
pub const PATCH_RESOURCE_TYPE_NAME: &str = PatchResource::TYPE_NAME;

/// Identity reported to the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderMetadata {
    /// Registry type name
    pub type_name: String,
    /// Provider version
    pub version: String,
}

/// The kubepatch provider
///
/// Holds the [`Client`] built by [`configure`](KubePatchProvider::configure)
/// and hands it to every resource it creates.
#[derive(Clone)]
pub struct KubePatchProvider {
    version: String,
    client: Option<Client>,
}

impl KubePatchProvider {
    /// An unconfigured provider reporting `version`
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            client: None,
        }
    }

    /// A provider using an existing client instead of configuring one
    pub fn with_client(version: impl Into<String>, client: Client) -> Self {
        Self {
            version: version.into(),
            client: Some(client),
        }
    }

    /// Type name and version
    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: PROVIDER_TYPE_NAME.to_string(),
            version: self.version.clone(),
        }
    }

    /// Schema of the provider configuration
    pub fn schema() -> Schema {
        schema::provider_schema()
    }

    /// Check a provider configuration without resolving it
    pub fn validate_config(&self, config: &Value) -> Diagnostics {
        let mut diagnostics = Self::schema().validate(config);
        if diagnostics.has_error() {
            return diagnostics;
        }
        match ProviderConfig::from_value(config.clone()) {
            Ok(model) => diagnostics.append(config::check_patterns(&model)),
            Err(err) => diagnostics.add_error("Invalid provider configuration", err.to_string()),
        }
        diagnostics
    }

    /// Resolve the configuration and build the client used by resources
    ///
    /// An invalid configuration only yields a warning and leaves the provider unconfigured.
    pub async fn configure(&mut self, config: Value) -> Diagnostics {
        self.client = None;
        let mut diagnostics = Self::schema().validate(&config);
        if diagnostics.has_error() {
            return diagnostics;
        }
        let model = match ProviderConfig::from_value(config) {
            Ok(model) => model,
            Err(err) => {
                diagnostics.add_error("Invalid provider configuration", err.to_string());
                return diagnostics;
            }
        };

        let Resolution {
            config,
            diagnostics: resolved,
        } = config::resolve(&model).await;
        diagnostics.append(resolved);
        let Some(config) = config else {
            return diagnostics;
        };
        if diagnostics.has_error() {
            return diagnostics;
        }

        debug!(cluster_url = %config.cluster_url, "building client");
        match Client::try_from(config) {
            Ok(client) => {
                info!("provider configured");
                self.client = Some(client);
            }
            Err(err) => diagnostics.push(Diagnostic::error("could not get clientset", err.to_string())),
        }
        diagnostics
    }

    /// The configured client, if any
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    /// Type names of the resources this provider serves
    pub fn resources(&self) -> Vec<&'static str> {
        vec![PATCH_RESOURCE_TYPE_NAME]
    }

    /// The patch resource, wired to the configured client
    pub fn patch_resource(&self) -> PatchResource {
        PatchResource::new(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};
    use kube::client::Body;
    use kubepatch_core::Severity;
    use serde_json::json;

    #[test]
    fn metadata_and_resources() {
        let provider = KubePatchProvider::new("1.2.3");
        assert_eq!(
            serde_json::to_value(provider.metadata()).unwrap(),
            json!({"type_name": "kubepatch", "version": "1.2.3"})
        );
        assert_eq!(provider.resources(), vec!["kubepatch_patch"]);
        assert!(provider.client().is_none());
    }

    #[test]
    fn validate_reports_schema_and_pattern_errors() {
        let provider = KubePatchProvider::new("0.1.0");
        let diags = provider.validate_config(&json!({"exec": [{"command": "aws"}]}));
        assert!(diags.has_error());
        assert_eq!(
            diags.iter().next().unwrap().attribute.as_ref().unwrap().to_string(),
            "exec[0].api_version"
        );

        let diags = provider.validate_config(&json!({"ignore_annotations": ["[z-a]"]}));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags.iter().next().unwrap().attribute.as_ref().unwrap().to_string(),
            "ignore_annotations[0]"
        );

        assert!(provider.validate_config(&json!({"host": "https://10.0.0.1"})).is_empty());
    }

    #[tokio::test]
    async fn configure_builds_client() {
        let mut provider = KubePatchProvider::new("0.1.0");
        let diags = provider
            .configure(json!({"host": "http://127.0.0.1:8080", "token": "abc", "config_paths": null}))
            .await;
        assert!(diags.is_empty(), "{diags:?}");
        assert!(provider.client().is_some());
        assert!(provider.patch_resource().is_configured());
    }

    #[tokio::test]
    async fn configure_rejects_bad_host() {
        let mut provider = KubePatchProvider::new("0.1.0");
        let diags = provider.configure(json!({"host": "not a host"})).await;
        assert!(diags.has_error());
        assert!(provider.client().is_none());
        assert!(!provider.patch_resource().is_configured());
    }

    #[tokio::test]
    async fn configure_warns_on_unusable_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let mut provider = KubePatchProvider::new("0.1.0");
        let diags = provider
            .configure(json!({"config_path": path.to_string_lossy()}))
            .await;
        assert!(!diags.has_error());
        assert_eq!(diags.iter().next().unwrap().severity, Severity::Warning);
        assert!(provider.client().is_none());
    }

    #[tokio::test]
    async fn experiments_are_deprecated() {
        let mut provider = KubePatchProvider::new("0.1.0");
        let diags = provider
            .configure(json!({"host": "http://127.0.0.1:8080", "experiments": [{"manifest_resource": true}]}))
            .await;
        assert!(!diags.has_error());
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Attribute Deprecated");
        assert_eq!(diag.attribute.as_ref().unwrap().to_string(), "experiments[0].manifest_resource");
        assert!(provider.client().is_some());
    }

    #[tokio::test]
    async fn existing_client_is_shared_with_resources() {
        let (mock_service, _handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let provider = KubePatchProvider::with_client("0.1.0", Client::new(mock_service, "default"));
        assert!(provider.patch_resource().is_configured());
    }
}
