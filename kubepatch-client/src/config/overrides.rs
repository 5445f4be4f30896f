use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use http::Uri;
use kube::{
    config::{
        AuthInfo, Cluster, Context, ExecConfig, ExecInteractiveMode, KubeConfigOptions, Kubeconfig,
        NamedAuthInfo, NamedCluster, NamedContext,
    },
    Config,
};
use kubepatch_core::{ExecSpec, ProviderConfig};
use secrecy::SecretString;
use tracing::debug;

use crate::{Error, Result};

/// Name of the cluster, user and context synthesized when no kubeconfig entry exists
pub const SYNTHETIC_NAME: &str = "kubepatch";

/// Complete a host into a server URL
///
/// A host without scheme or authority is prefixed with `https://` when `default_tls` is set, `http://` otherwise.
pub fn default_server_url(host: &str, default_tls: bool) -> Result<Uri> {
    if let Ok(uri) = host.parse::<Uri>() {
        if uri.scheme().is_some() && uri.authority().is_some() {
            return Ok(uri);
        }
    }
    let scheme = if default_tls { "https" } else { "http" };
    format!("{scheme}://{host}")
        .parse::<Uri>()
        .map_err(|source| Error::InvalidHost {
            host: host.to_string(),
            source,
        })
}

/// Values from the provider configuration that take precedence over any kubeconfig file
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Context to select instead of `current-context`
    pub context: Option<String>,
    /// User to select instead of the context's user
    pub auth_info: Option<String>,
    /// Cluster to select instead of the context's cluster
    pub cluster: Option<String>,

    /// Fully qualified server URL
    pub server: Option<String>,
    /// Skip server certificate verification
    pub insecure: Option<bool>,
    /// SNI and verification name
    pub tls_server_name: Option<String>,
    /// PEM root certificates
    pub certificate_authority: Option<String>,
    /// Default proxy, used when the selected cluster has none
    pub proxy_url: Option<String>,

    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Bearer token
    pub token: Option<String>,
    /// PEM client certificate
    pub client_certificate: Option<String>,
    /// PEM client key
    pub client_key: Option<String>,
    /// Credential plugin
    pub exec: Option<ExecConfig>,
}

impl ConfigOverrides {
    /// Collect overrides from the provider configuration
    ///
    /// Context selection only applies when kubeconfig files are in play, as indicated by `from_files`.
    pub fn new(config: &ProviderConfig, from_files: bool) -> Result<Self> {
        let mut overrides = ConfigOverrides {
            insecure: config.insecure,
            tls_server_name: config.tls_server_name.clone(),
            certificate_authority: config.cluster_ca_certificate.clone(),
            proxy_url: config.proxy_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: config.token.clone(),
            client_certificate: config.client_certificate.clone(),
            client_key: config.client_key.clone(),
            exec: config.exec.first().map(exec_config),
            ..Default::default()
        };

        if from_files {
            overrides.context = config.config_context.clone();
            overrides.auth_info = config.config_context_auth_info.clone();
            overrides.cluster = config.config_context_cluster.clone();
            if overrides.context.is_some() || overrides.auth_info.is_some() || overrides.cluster.is_some() {
                debug!(
                    "Using overridden context: {:?}; auth_info: {:?}; cluster: {:?}",
                    overrides.context, overrides.auth_info, overrides.cluster
                );
            } else {
                debug!("Using default context");
            }
        }

        if let Some(host) = config.host.as_deref().filter(|h| !h.is_empty()) {
            let has_ca = config.cluster_ca_certificate.as_deref().is_some_and(|c| !c.is_empty());
            let has_cert = config.client_certificate.as_deref().is_some_and(|c| !c.is_empty());
            let default_tls = (has_ca || has_cert) && config.insecure != Some(true);
            overrides.server = Some(default_server_url(host, default_tls)?.to_string());
        }

        Ok(overrides)
    }

    /// Apply the overrides to `kubeconfig`, returning the options selecting the overridden entries
    ///
    /// Entries that do not exist yet are created under [`SYNTHETIC_NAME`].
    pub fn apply(&self, kubeconfig: &mut Kubeconfig) -> Result<KubeConfigOptions> {
        let context_name = match self.context.clone().or_else(|| kubeconfig.current_context.clone()) {
            Some(name) => name,
            None => {
                kubeconfig.current_context = Some(SYNTHETIC_NAME.to_string());
                SYNTHETIC_NAME.to_string()
            }
        };
        let (context_cluster, context_user) = match context_refs(kubeconfig, &context_name) {
            Some(refs) => refs,
            None if self.context.is_none() => {
                kubeconfig.contexts.push(NamedContext {
                    name: context_name.clone(),
                    context: Some(synthetic_context()),
                });
                (None, None)
            }
            // an explicitly requested context that does not exist fails when loading
            None => (None, None),
        };

        let cluster_name = self
            .cluster
            .clone()
            .or(context_cluster)
            .unwrap_or_else(|| SYNTHETIC_NAME.to_string());
        let user_name = self
            .auth_info
            .clone()
            .or(context_user)
            .unwrap_or_else(|| SYNTHETIC_NAME.to_string());

        self.apply_cluster(named_cluster(kubeconfig, &cluster_name));
        self.apply_auth_info(named_auth_info(kubeconfig, &user_name));

        Ok(KubeConfigOptions {
            context: Some(context_name),
            cluster: Some(cluster_name),
            user: Some(user_name),
        })
    }

    /// Apply the overrides to an already built configuration, such as the in-cluster one
    ///
    /// Context selection has no meaning here and is ignored.
    pub fn apply_to_config(&self, config: &mut Config) -> Result<()> {
        if let Some(server) = &self.server {
            config.cluster_url = server.parse().map_err(|source| Error::InvalidHost {
                host: server.clone(),
                source,
            })?;
        }
        if let Some(insecure) = self.insecure {
            config.accept_invalid_certs = insecure;
        }
        if let Some(name) = &self.tls_server_name {
            config.tls_server_name = Some(name.clone());
        }
        if let Some(pem) = &self.certificate_authority {
            config.root_cert = Some(certificates(pem)?);
        }
        if config.proxy_url.is_none() {
            if let Some(url) = &self.proxy_url {
                let proxy = url.parse().map_err(|source| Error::InvalidProxyUrl {
                    url: url.clone(),
                    source,
                })?;
                config.proxy_url = Some(proxy);
            }
        }
        self.apply_auth_info(&mut config.auth_info);
        Ok(())
    }

    fn apply_cluster(&self, cluster: &mut Cluster) {
        if let Some(insecure) = self.insecure {
            cluster.insecure_skip_tls_verify = Some(insecure);
        }
        if let Some(name) = &self.tls_server_name {
            cluster.tls_server_name = Some(name.clone());
        }
        if let Some(pem) = &self.certificate_authority {
            cluster.certificate_authority = None;
            cluster.certificate_authority_data = Some(STANDARD.encode(pem));
        }
        if let Some(server) = &self.server {
            cluster.server = Some(server.clone());
        }
        if cluster.proxy_url.is_none() {
            cluster.proxy_url = self.proxy_url.clone();
        }
    }

    fn apply_auth_info(&self, user: &mut AuthInfo) {
        if let Some(pem) = &self.client_certificate {
            user.client_certificate = None;
            user.client_certificate_data = Some(STANDARD.encode(pem));
        }
        if let Some(username) = &self.username {
            user.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            user.password = Some(SecretString::from(password.clone()));
        }
        if let Some(pem) = &self.client_key {
            user.client_key = None;
            user.client_key_data = Some(SecretString::from(STANDARD.encode(pem)));
        }
        if let Some(token) = &self.token {
            user.token = Some(SecretString::from(token.clone()));
            user.token_file = None;
        }
        if let Some(exec) = &self.exec {
            user.exec = Some(exec.clone());
        }
    }
}

/// Translate an `exec` block into a kubeconfig credential plugin
fn exec_config(spec: &ExecSpec) -> ExecConfig {
    let env = spec
        .env
        .iter()
        .map(|(name, value)| HashMap::from([("name".to_string(), name.clone()), ("value".to_string(), value.clone())]))
        .collect();
    ExecConfig {
        api_version: Some(spec.api_version.clone()),
        command: Some(spec.command.clone()),
        args: Some(spec.args.clone()),
        env: Some(env),
        drop_env: None,
        interactive_mode: Some(ExecInteractiveMode::IfAvailable),
        provide_cluster_info: false,
        cluster: None,
    }
}

/// DER contents of every `CERTIFICATE` block in `pem`
fn certificates(pem: &str) -> Result<Vec<Vec<u8>>> {
    let blocks = pem::parse_many(pem).map_err(Error::Certificates)?;
    Ok(blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(pem::Pem::into_contents)
        .collect())
}

fn synthetic_context() -> Context {
    Context {
        cluster: SYNTHETIC_NAME.to_string(),
        user: Some(SYNTHETIC_NAME.to_string()),
        ..Default::default()
    }
}

/// Cluster and user names referenced by a context
fn context_refs(kubeconfig: &Kubeconfig, name: &str) -> Option<(Option<String>, Option<String>)> {
    let context = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == name)?
        .context
        .as_ref()?;
    let cluster = Some(context.cluster.clone()).filter(|c| !c.is_empty());
    let user = context.user.clone().filter(|u| !u.is_empty());
    Some((cluster, user))
}

fn named_cluster<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut Cluster {
    let idx = match kubeconfig.clusters.iter().position(|c| c.name == name) {
        Some(idx) => idx,
        None => {
            kubeconfig.clusters.push(NamedCluster {
                name: name.to_string(),
                cluster: None,
            });
            kubeconfig.clusters.len() - 1
        }
    };
    kubeconfig.clusters[idx].cluster.get_or_insert_with(Cluster::default)
}

fn named_auth_info<'a>(kubeconfig: &'a mut Kubeconfig, name: &str) -> &'a mut AuthInfo {
    let idx = match kubeconfig.auth_infos.iter().position(|u| u.name == name) {
        Some(idx) => idx,
        None => {
            kubeconfig.auth_infos.push(NamedAuthInfo {
                name: name.to_string(),
                auth_info: None,
            });
            kubeconfig.auth_infos.len() - 1
        }
    };
    kubeconfig.auth_infos[idx].auth_info.get_or_insert_with(AuthInfo::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use secrecy::ExposeSecret;
    use serde_json::json;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://0.0.0.0:6443
    proxy-url: http://proxy.internal:3128
  name: k3d-test
- cluster:
    server: https://10.1.1.1:6443
  name: staging
contexts:
- context:
    cluster: k3d-test
    user: admin@k3d-test
  name: k3d-test
- context:
    cluster: staging
    user: deployer
  name: staging
current-context: k3d-test
users:
- name: admin@k3d-test
  user:
    token: from-file
- name: deployer
  user:
    username: deployer
"#;

    fn cluster<'a>(kubeconfig: &'a Kubeconfig, name: &str) -> &'a Cluster {
        kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.cluster.as_ref())
            .unwrap()
    }

    fn user<'a>(kubeconfig: &'a Kubeconfig, name: &str) -> &'a AuthInfo {
        kubeconfig
            .auth_infos
            .iter()
            .find(|u| u.name == name)
            .and_then(|u| u.auth_info.as_ref())
            .unwrap()
    }

    #[test]
    fn server_url_defaults() {
        assert_eq!(
            default_server_url("10.0.0.1:6443", true).unwrap().to_string(),
            "https://10.0.0.1:6443/"
        );
        assert_eq!(
            default_server_url("10.0.0.1:6443", false).unwrap().to_string(),
            "http://10.0.0.1:6443/"
        );
        assert_eq!(
            default_server_url("https://k8s.example.com", false).unwrap().to_string(),
            "https://k8s.example.com/"
        );
        assert!(matches!(
            default_server_url("not a host", true),
            Err(Error::InvalidHost { host, .. }) if host == "not a host"
        ));
    }

    #[test]
    fn host_scheme_follows_tls_material() {
        let with_ca = ProviderConfig {
            host: Some("10.0.0.1:6443".into()),
            cluster_ca_certificate: Some("-----BEGIN CERTIFICATE-----".into()),
            ..Default::default()
        };
        let overrides = ConfigOverrides::new(&with_ca, false).unwrap();
        assert_eq!(overrides.server.as_deref(), Some("https://10.0.0.1:6443/"));

        let insecure = ProviderConfig {
            insecure: Some(true),
            ..with_ca
        };
        let overrides = ConfigOverrides::new(&insecure, false).unwrap();
        assert_eq!(overrides.server.as_deref(), Some("http://10.0.0.1:6443/"));
    }

    #[test]
    fn context_selection_needs_files() {
        let config = ProviderConfig {
            config_context: Some("staging".into()),
            ..Default::default()
        };
        assert_eq!(ConfigOverrides::new(&config, false).unwrap().context, None);
        assert_eq!(
            ConfigOverrides::new(&config, true).unwrap().context.as_deref(),
            Some("staging")
        );
    }

    #[test]
    fn overrides_land_on_the_current_context() {
        let mut kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        let overrides = ConfigOverrides::new(
            &ProviderConfig {
                host: Some("https://10.9.9.9:6443".into()),
                token: Some("from-provider".into()),
                cluster_ca_certificate: Some("PEM".into()),
                proxy_url: Some("http://other:3128".into()),
                ..Default::default()
            },
            true,
        )
        .unwrap();
        let options = overrides.apply(&mut kubeconfig).unwrap();
        assert_eq!(options.context.as_deref(), Some("k3d-test"));
        assert_eq!(options.cluster.as_deref(), Some("k3d-test"));
        assert_eq!(options.user.as_deref(), Some("admin@k3d-test"));

        let cluster = cluster(&kubeconfig, "k3d-test");
        assert_eq!(cluster.server.as_deref(), Some("https://10.9.9.9:6443/"));
        assert_eq!(cluster.certificate_authority_data.as_deref(), Some("UEVN"));
        // the kubeconfig proxy wins over the provider default
        assert_eq!(cluster.proxy_url.as_deref(), Some("http://proxy.internal:3128"));
        let token = user(&kubeconfig, "admin@k3d-test").token.as_ref().unwrap();
        assert_eq!(token.expose_secret(), "from-provider");
        // untouched entries stay as they were
        assert_eq!(cluster_server(&kubeconfig, "staging"), "https://10.1.1.1:6443");
    }

    fn cluster_server(kubeconfig: &Kubeconfig, name: &str) -> String {
        cluster(kubeconfig, name).server.clone().unwrap()
    }

    #[test]
    fn selected_context_cluster_and_user() {
        let mut kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        let overrides = ConfigOverrides::new(
            &ProviderConfig {
                config_context: Some("k3d-test".into()),
                config_context_cluster: Some("staging".into()),
                config_context_auth_info: Some("deployer".into()),
                password: Some("hunter2".into()),
                insecure: Some(true),
                ..Default::default()
            },
            true,
        )
        .unwrap();
        let options = overrides.apply(&mut kubeconfig).unwrap();
        assert_eq!(options.cluster.as_deref(), Some("staging"));
        assert_eq!(options.user.as_deref(), Some("deployer"));
        assert_eq!(cluster(&kubeconfig, "staging").insecure_skip_tls_verify, Some(true));
        assert_eq!(cluster(&kubeconfig, "k3d-test").insecure_skip_tls_verify, None);
        let deployer = user(&kubeconfig, "deployer");
        assert_eq!(deployer.username.as_deref(), Some("deployer"));
        assert_eq!(deployer.password.as_ref().unwrap().expose_secret(), "hunter2");
    }

    #[test]
    fn synthesizes_entries_without_files() {
        let mut kubeconfig = Kubeconfig::default();
        let overrides = ConfigOverrides::new(
            &ProviderConfig {
                host: Some("k8s.example.com".into()),
                client_certificate: Some("CERT".into()),
                client_key: Some("KEY".into()),
                proxy_url: Some("http://proxy:3128".into()),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        let options = overrides.apply(&mut kubeconfig).unwrap();
        assert_eq!(options.context.as_deref(), Some(SYNTHETIC_NAME));
        assert_eq!(kubeconfig.current_context.as_deref(), Some(SYNTHETIC_NAME));
        assert_eq!(kubeconfig.contexts.len(), 1);

        let cluster = cluster(&kubeconfig, SYNTHETIC_NAME);
        assert_eq!(cluster.server.as_deref(), Some("https://k8s.example.com/"));
        assert_eq!(cluster.proxy_url.as_deref(), Some("http://proxy:3128"));
        let user = user(&kubeconfig, SYNTHETIC_NAME);
        assert_eq!(user.client_certificate_data.as_deref(), Some("Q0VSVA=="));
        assert_eq!(user.client_key_data.as_ref().unwrap().expose_secret(), "S0VZ");
    }

    #[test]
    fn exec_plugin_is_interactive_if_available() {
        let overrides = ConfigOverrides::new(
            &ProviderConfig {
                exec: vec![ExecSpec {
                    api_version: "client.authentication.k8s.io/v1beta1".into(),
                    command: "aws".into(),
                    args: vec!["eks".into(), "get-token".into()],
                    env: [("AWS_PROFILE".to_string(), "ops".to_string())].into(),
                }],
                ..Default::default()
            },
            false,
        )
        .unwrap();
        let exec = overrides.exec.unwrap();
        assert_eq!(exec.command.as_deref(), Some("aws"));
        assert_eq!(exec.api_version.as_deref(), Some("client.authentication.k8s.io/v1beta1"));
        assert_eq!(exec.args, Some(vec!["eks".to_string(), "get-token".to_string()]));
        assert_json_eq!(
            serde_json::to_value(&exec).unwrap(),
            json!({
                "apiVersion": "client.authentication.k8s.io/v1beta1",
                "command": "aws",
                "args": ["eks", "get-token"],
                "env": [{"name": "AWS_PROFILE", "value": "ops"}],
                "interactiveMode": "IfAvailable",
                "provideClusterInfo": false,
            })
        );
    }

    #[test]
    fn overrides_apply_to_a_built_config() {
        let mut config = Config::new("https://10.96.0.1/".parse().unwrap());
        config.auth_info.token_file = Some("/var/run/secrets/kubernetes.io/serviceaccount/token".into());
        let overrides = ConfigOverrides::new(
            &ProviderConfig {
                token: Some("from-provider".into()),
                insecure: Some(true),
                tls_server_name: Some("kubernetes.default".into()),
                cluster_ca_certificate: Some("-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----\n".into()),
                proxy_url: Some("http://proxy:3128".into()),
                exec: vec![ExecSpec {
                    api_version: "client.authentication.k8s.io/v1".into(),
                    command: "token-helper".into(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            false,
        )
        .unwrap();
        overrides.apply_to_config(&mut config).unwrap();

        assert_eq!(config.cluster_url.to_string(), "https://10.96.0.1/");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.tls_server_name.as_deref(), Some("kubernetes.default"));
        assert_eq!(config.root_cert, Some(vec![vec![1, 2, 3]]));
        assert_eq!(config.proxy_url.as_ref().map(ToString::to_string).as_deref(), Some("http://proxy:3128/"));
        assert_eq!(config.auth_info.token.as_ref().unwrap().expose_secret(), "from-provider");
        assert_eq!(config.auth_info.token_file, None);
        assert_eq!(
            config.auth_info.exec.as_ref().and_then(|e| e.command.as_deref()),
            Some("token-helper")
        );
    }

    #[test]
    fn built_config_rejects_bad_ca() {
        let mut config = Config::new("https://10.96.0.1/".parse().unwrap());
        let overrides = ConfigOverrides {
            certificate_authority: Some("-----BEGIN CERTIFICATE-----\n!!!\n-----END CERTIFICATE-----\n".into()),
            ..Default::default()
        };
        assert!(matches!(
            overrides.apply_to_config(&mut config),
            Err(Error::Certificates(_))
        ));
        assert_eq!(config.root_cert, None);
    }
}
