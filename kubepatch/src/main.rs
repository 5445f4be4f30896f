//! `kubepatch` command line: print schemas, apply one patch, or serve a host over stdio
use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kubepatch::{
    core::{Diagnostics, ExecSpec, PatchResourceModel, ProviderConfig},
    KubePatchProvider, Server,
};
use tokio::io::BufReader;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kubepatch", version, about)]
struct App {
    /// Provider version reported to hosts
    #[arg(long, global = true, env = "KUBEPATCH_VERSION_STRING", default_value = env!("CARGO_PKG_VERSION"))]
    version_string: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the provider and resource schemas
    Schema {
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputMode,
    },
    /// Configure the provider and apply a single patch
    Patch {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        target: PatchArgs,
    },
    /// Serve requests from a host on stdin and stdout
    Serve,
}

#[derive(ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
enum OutputMode {
    #[default]
    Json,
    Yaml,
}

#[derive(Args)]
struct ProviderArgs {
    /// API server host, e.g. https://10.0.0.1:6443
    #[arg(long, env = "KUBEPATCH_HOST")]
    host: Option<String>,
    #[arg(long, env = "KUBEPATCH_USERNAME")]
    username: Option<String>,
    #[arg(long, env = "KUBEPATCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Skip server certificate verification
    #[arg(long, env = "KUBEPATCH_INSECURE")]
    insecure: Option<bool>,
    #[arg(long, env = "KUBEPATCH_TLS_SERVER_NAME")]
    tls_server_name: Option<String>,
    /// PEM encoded client certificate
    #[arg(long, env = "KUBEPATCH_CLIENT_CERTIFICATE", hide_env_values = true)]
    client_certificate: Option<String>,
    /// PEM encoded client key
    #[arg(long, env = "KUBEPATCH_CLIENT_KEY", hide_env_values = true)]
    client_key: Option<String>,
    /// PEM encoded root certificates
    #[arg(long, env = "KUBEPATCH_CLUSTER_CA_CERTIFICATE", hide_env_values = true)]
    cluster_ca_certificate: Option<String>,
    /// Kubeconfig files to merge; repeat or comma separate
    #[arg(long, env = "KUBEPATCH_CONFIG_PATHS", value_delimiter = ',')]
    config_paths: Vec<String>,
    #[arg(long, env = "KUBEPATCH_CONFIG_PATH")]
    config_path: Option<String>,
    #[arg(long, env = "KUBEPATCH_CONFIG_CONTEXT")]
    config_context: Option<String>,
    #[arg(long, env = "KUBEPATCH_CONFIG_CONTEXT_AUTH_INFO")]
    config_context_auth_info: Option<String>,
    #[arg(long, env = "KUBEPATCH_CONFIG_CONTEXT_CLUSTER")]
    config_context_cluster: Option<String>,
    #[arg(long, env = "KUBEPATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, env = "KUBEPATCH_PROXY_URL")]
    proxy_url: Option<String>,
    #[arg(long, env = "KUBEPATCH_IGNORE_ANNOTATIONS", value_delimiter = ',')]
    ignore_annotations: Vec<String>,
    #[arg(long, env = "KUBEPATCH_IGNORE_LABELS", value_delimiter = ',')]
    ignore_labels: Vec<String>,
    /// Credential plugin command
    #[arg(long, env = "KUBEPATCH_EXEC_COMMAND", requires = "exec_api_version")]
    exec_command: Option<String>,
    #[arg(long, env = "KUBEPATCH_EXEC_API_VERSION", requires = "exec_command")]
    exec_api_version: Option<String>,
    #[arg(long = "exec-arg", env = "KUBEPATCH_EXEC_ARGS", value_delimiter = ',')]
    exec_args: Vec<String>,
    /// Credential plugin environment as KEY=VALUE
    #[arg(long = "exec-env", env = "KUBEPATCH_EXEC_ENV", value_delimiter = ',', value_parser = parse_key_val)]
    exec_env: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

impl ProviderArgs {
    fn into_config(self) -> ProviderConfig {
        let exec = match (self.exec_api_version, self.exec_command) {
            (Some(api_version), Some(command)) => vec![ExecSpec {
                api_version,
                command,
                env: self.exec_env.into_iter().collect::<BTreeMap<_, _>>(),
                args: self.exec_args,
            }],
            _ => vec![],
        };
        ProviderConfig {
            host: self.host,
            username: self.username,
            password: self.password,
            insecure: self.insecure,
            tls_server_name: self.tls_server_name,
            client_certificate: self.client_certificate,
            client_key: self.client_key,
            cluster_ca_certificate: self.cluster_ca_certificate,
            config_paths: self.config_paths,
            config_path: self.config_path,
            config_context: self.config_context,
            config_context_auth_info: self.config_context_auth_info,
            config_context_cluster: self.config_context_cluster,
            token: self.token,
            proxy_url: self.proxy_url,
            ignore_annotations: self.ignore_annotations,
            ignore_labels: self.ignore_labels,
            exec,
            experiments: vec![],
        }
    }
}

#[derive(Args)]
struct PatchArgs {
    /// Namespace of the object
    #[arg(long, short, default_value = "default")]
    namespace: String,
    /// Plural resource name, e.g. deployments
    #[arg(long, short)]
    resource: String,
    /// Name of the object
    #[arg(long)]
    name: String,
    #[arg(long = "type", value_parser = ["json", "merge", "strategic"])]
    patch_type: String,
    /// Patch body
    #[arg(long, conflicts_with = "data_file", required_unless_present = "data_file")]
    data: Option<String>,
    /// File holding the patch body
    #[arg(long)]
    data_file: Option<PathBuf>,
}

/// Print diagnostics to stderr, failing if any of them is an error
fn report(diagnostics: &Diagnostics, context: &str) -> Result<()> {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
    debug!(context, count = diagnostics.len(), "reported diagnostics");
    if diagnostics.has_error() {
        bail!("{context} failed");
    }
    Ok(())
}

fn schema(output: OutputMode) -> Result<()> {
    let schemas = kubepatch::schemas();
    match output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&schemas)?),
        OutputMode::Yaml => print!("{}", serde_yaml::to_string(&schemas)?),
    }
    Ok(())
}

async fn patch(version: &str, provider: ProviderArgs, target: PatchArgs) -> Result<()> {
    let data = match (target.data, &target.data_file) {
        (Some(data), _) => data,
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => bail!("one of --data or --data-file is required"),
    };
    let model = PatchResourceModel {
        namespace: target.namespace,
        resource: target.resource,
        name: target.name,
        patch_type: target.patch_type,
        data,
        id: None,
    };

    let mut kubepatch = KubePatchProvider::new(version);
    let config = serde_json::to_value(provider.into_config())?;
    report(&kubepatch.configure(config).await, "configure")?;

    let resource = kubepatch.patch_resource();
    report(&resource.validate(&model.to_value()), "validate")?;
    let response = resource.create(model).await;
    report(&response.diagnostics, "patch")?;
    if let Some(state) = response.state {
        info!(id = ?state.id, "patched");
        println!("{}", serde_json::to_string_pretty(&state.to_value())?);
    }
    Ok(())
}

async fn serve(version: &str) -> Result<()> {
    info!(version, "serving on stdio");
    let mut server = Server::new(KubePatchProvider::new(version));
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries responses, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let app = App::parse();
    match app.command {
        Command::Schema { output } => schema(output),
        Command::Patch { provider, target } => patch(&app.version_string, provider, target).await,
        Command::Serve => serve(&app.version_string).await,
    }
}
