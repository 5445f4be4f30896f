use anyhow::{bail, ensure, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use kubepatch::{core::PatchResourceModel, KubePatchProvider};
use serde_json::json;
use tracing::info;

const NAMESPACE: &str = "default";
const DEPLOYMENT: &str = "opentelemetry-operator-controller-manager";

const ARGS: &[&str] = &[
    "--metrics-addr=127.0.0.1:8080",
    "--enable-leader-election",
    "--zap-log-level=info",
    "--zap-time-encoding=rfc3339nano",
    "--enable-nginx-instrumentation=true",
    "--enable-go-instrumentation=true",
];

fn env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set for the e2e run"))
}

fn pem_env(name: &str) -> Result<String> {
    let decoded = STANDARD.decode(env(name)?).with_context(|| format!("{name} is not base64"))?;
    String::from_utf8(decoded).with_context(|| format!("{name} is not PEM"))
}

fn replace_args(args: &[&str]) -> PatchResourceModel {
    PatchResourceModel {
        namespace: NAMESPACE.into(),
        resource: "deployments".into(),
        name: DEPLOYMENT.into(),
        patch_type: "json".into(),
        data: json!([{
            "op": "replace",
            "path": "/spec/template/spec/containers/0/args",
            "value": args,
        }])
        .to_string(),
        id: None,
    }
}

async fn verify_args(deployments: &Api<Deployment>, expected: &[&str]) -> Result<()> {
    let deployment = deployments.get(DEPLOYMENT).await?;
    let args = deployment
        .spec
        .and_then(|s| s.template.spec)
        .and_then(|s| s.containers.into_iter().next())
        .and_then(|c| c.args)
        .unwrap_or_default();
    ensure!(
        args == expected,
        "expected args {expected:?}, got {args:?}"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut provider = KubePatchProvider::new("e2e");
    let diagnostics = provider
        .configure(json!({
            "host": env("KUBEPATCH_HOST")?,
            "cluster_ca_certificate": pem_env("KUBEPATCH_CLUSTER_CA_CERTIFICATE")?,
            "client_certificate": pem_env("KUBEPATCH_CLIENT_CERTIFICATE")?,
            "client_key": pem_env("KUBEPATCH_CLIENT_KEY")?,
        }))
        .await;
    ensure!(!diagnostics.has_error(), "configure failed: {diagnostics:?}");
    let Some(client) = provider.client().cloned() else {
        bail!("provider left unconfigured: {diagnostics:?}");
    };
    let deployments: Api<Deployment> = Api::namespaced(client, NAMESPACE);
    let resource = provider.patch_resource();
    let id = format!("{NAMESPACE}/deployments/{DEPLOYMENT}");

    info!("Creating patch");
    let plan = resource
        .plan(None, Some(replace_args(ARGS)))
        .context("empty plan")?;
    let created = resource.create(plan).await;
    ensure!(created.diagnostics.is_empty(), "create failed: {:?}", created.diagnostics);
    let state = created.state.context("create returned no state")?;
    ensure!(state.id.as_deref() == Some(id.as_str()), "unexpected id {:?}", state.id);
    verify_args(&deployments, ARGS).await?;

    info!("Updating patch");
    let mut updated_args = ARGS.to_vec();
    updated_args.push("enable-dotnet-instrumentation=true");
    let plan = resource
        .plan(Some(&state), Some(replace_args(&updated_args)))
        .context("empty plan")?;
    ensure!(plan.id.as_deref() == Some(id.as_str()), "id not carried into plan");
    let updated = resource.update(plan).await;
    ensure!(updated.diagnostics.is_empty(), "update failed: {:?}", updated.diagnostics);
    let state = updated.state.context("update returned no state")?;
    verify_args(&deployments, &updated_args).await?;

    info!("Reading patch");
    let read = resource.read(state.clone()).await;
    ensure!(read.state.as_ref() == Some(&state), "state changed on read: {read:?}");

    info!("Deleting patch");
    let deleted = resource.delete(state).await;
    ensure!(deleted.state.is_none() && deleted.diagnostics.is_empty());
    verify_args(&deployments, &updated_args).await?;
    Ok(())
}
