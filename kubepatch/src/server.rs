//! Line delimited JSON request/response loop between a host and the provider
//!
//! Each input line is one request, `{"method": "...", "params": {...}}`,
//! and is answered by exactly one output line, `{"result": ..., "diagnostics": [...]}`.
//! Malformed requests are answered with an error diagnostic; the loop keeps going
//! until a `stop` request or the end of input.
use kubepatch_client::{
    provider::PATCH_RESOURCE_TYPE_NAME, resource::ResourceResponse, KubePatchProvider, PatchResource,
};
use kubepatch_core::{Diagnostic, Diagnostics, PatchResourceModel};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Reasons a request line cannot be handled
#[derive(Error, Debug)]
pub enum Error {
    /// The line is not a request object
    #[error("malformed request: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The method is not one the server knows
    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    /// The params do not fit the method
    #[error("invalid params for {method}: {source}")]
    InvalidParams {
        /// The requested method
        method: String,
        /// Why decoding failed
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

/// Params of requests carrying a provider configuration
#[derive(Clone, Debug, Deserialize)]
pub struct ConfigParams {
    /// The provider configuration object
    #[serde(default)]
    pub config: Value,
}

/// Params of `validate_resource_config`
#[derive(Clone, Debug, Deserialize)]
pub struct ResourceConfigParams {
    /// Resource type name
    pub type_name: String,
    /// The resource configuration object
    #[serde(default)]
    pub config: Value,
}

/// Params of `plan_resource_change`
#[derive(Clone, Debug, Deserialize)]
pub struct PlanParams {
    /// Resource type name
    pub type_name: String,
    /// Current state; absent on create
    #[serde(default)]
    pub prior_state: Option<Value>,
    /// Desired configuration; absent on destroy
    #[serde(default)]
    pub proposed_state: Option<Value>,
}

/// Params of `apply_resource_change`
#[derive(Clone, Debug, Deserialize)]
pub struct ApplyParams {
    /// Resource type name
    pub type_name: String,
    /// Current state; absent on create
    #[serde(default)]
    pub prior_state: Option<Value>,
    /// Planned state; absent on destroy
    #[serde(default)]
    pub planned_state: Option<Value>,
}

/// Params of `read_resource`
#[derive(Clone, Debug, Deserialize)]
pub struct ReadParams {
    /// Resource type name
    pub type_name: String,
    /// State to refresh
    pub current_state: Value,
}

/// Params of `import_resource_state`
#[derive(Clone, Debug, Deserialize)]
pub struct ImportParams {
    /// Resource type name
    pub type_name: String,
    /// Identifier given by the user
    pub id: String,
}

/// A decoded request
#[derive(Clone, Debug)]
pub enum Request {
    /// Provider and resource schemas
    GetSchema,
    /// Provider type name, version and resources
    GetMetadata,
    /// Validate a provider configuration
    ValidateProviderConfig(ConfigParams),
    /// Configure the provider
    ConfigureProvider(ConfigParams),
    /// Validate a resource configuration
    ValidateResourceConfig(ResourceConfigParams),
    /// Plan a resource change
    PlanResourceChange(PlanParams),
    /// Apply a planned resource change
    ApplyResourceChange(ApplyParams),
    /// Refresh a resource
    ReadResource(ReadParams),
    /// Import an existing resource by id
    ImportResourceState(ImportParams),
    /// End the session
    Stop,
}

fn params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, Error> {
    serde_json::from_value(params).map_err(|source| Error::InvalidParams {
        method: method.to_string(),
        source,
    })
}

impl Request {
    /// Decode a request line
    pub fn parse(line: &str) -> Result<Self, Error> {
        let raw: RawRequest = serde_json::from_str(line).map_err(Error::Malformed)?;
        let method = raw.method.as_str();
        Ok(match method {
            "get_schema" => Request::GetSchema,
            "get_metadata" => Request::GetMetadata,
            "validate_provider_config" => Request::ValidateProviderConfig(params(method, raw.params)?),
            "configure_provider" => Request::ConfigureProvider(params(method, raw.params)?),
            "validate_resource_config" => Request::ValidateResourceConfig(params(method, raw.params)?),
            "plan_resource_change" => Request::PlanResourceChange(params(method, raw.params)?),
            "apply_resource_change" => Request::ApplyResourceChange(params(method, raw.params)?),
            "read_resource" => Request::ReadResource(params(method, raw.params)?),
            "import_resource_state" => Request::ImportResourceState(params(method, raw.params)?),
            "stop" => Request::Stop,
            other => return Err(Error::UnknownMethod(other.to_string())),
        })
    }
}

/// One response line
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Method specific result; `null` when there is none
    pub result: Value,
    /// Problems found while handling the request
    pub diagnostics: Diagnostics,
}

impl Response {
    fn result(result: Value) -> Self {
        Self {
            result,
            diagnostics: Diagnostics::new(),
        }
    }

    fn diagnostics(diagnostics: Diagnostics) -> Self {
        Self {
            result: Value::Null,
            diagnostics,
        }
    }

    fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::diagnostics(Diagnostic::error(summary, detail).into())
    }
}

impl From<ResourceResponse> for Response {
    fn from(response: ResourceResponse) -> Self {
        Self {
            result: response.state.map_or(Value::Null, |s| s.to_value()),
            diagnostics: response.diagnostics,
        }
    }
}

/// Serves a [`KubePatchProvider`] to a host
pub struct Server {
    provider: KubePatchProvider,
}

impl Server {
    /// Serve `provider`
    pub fn new(provider: KubePatchProvider) -> Self {
        Self { provider }
    }

    /// The served provider
    pub fn provider(&self) -> &KubePatchProvider {
        &self.provider
    }

    /// Answer requests from `reader` on `writer` until `stop` or end of input
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(err) => {
                    warn!("Rejecting request: {err}");
                    let response = Response::error("Invalid request", format!("request is not UTF-8: {err}"));
                    write_response(&mut writer, &response).await?;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            let (response, stop) = match Request::parse(line) {
                Ok(Request::Stop) => (Response::default(), true),
                Ok(request) => (self.handle(request).await, false),
                Err(err) => {
                    warn!("Rejecting request: {err}");
                    (Response::error("Invalid request", err.to_string()), false)
                }
            };
            write_response(&mut writer, &response).await?;
            if stop {
                debug!("stop requested");
                break;
            }
        }
        Ok(())
    }

    /// Handle a single request
    pub async fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::GetSchema => Response::result(schemas()),
            Request::GetMetadata => {
                let metadata = self.provider.metadata();
                Response::result(json!({
                    "type_name": metadata.type_name,
                    "version": metadata.version,
                    "resources": self.provider.resources(),
                }))
            }
            Request::ValidateProviderConfig(p) => Response::diagnostics(self.provider.validate_config(&p.config)),
            Request::ConfigureProvider(p) => Response::diagnostics(self.provider.configure(p.config).await),
            Request::ValidateResourceConfig(p) => match check_type(&p.type_name) {
                Err(response) => response,
                Ok(()) => Response::diagnostics(self.provider.patch_resource().validate(&p.config)),
            },
            Request::PlanResourceChange(p) => {
                if let Err(response) = check_type(&p.type_name) {
                    return response;
                }
                let prior = match decode_state(p.prior_state) {
                    Ok(prior) => prior,
                    Err(response) => return response,
                };
                let proposed = match decode_state(p.proposed_state) {
                    Ok(proposed) => proposed,
                    Err(response) => return response,
                };
                let planned = self.provider.patch_resource().plan(prior.as_ref(), proposed);
                Response::result(planned.map_or(Value::Null, |p| p.to_value()))
            }
            Request::ApplyResourceChange(p) => {
                if let Err(response) = check_type(&p.type_name) {
                    return response;
                }
                let prior = match decode_state(p.prior_state) {
                    Ok(prior) => prior,
                    Err(response) => return response,
                };
                let planned = match decode_state(p.planned_state) {
                    Ok(planned) => planned,
                    Err(response) => return response,
                };
                let resource = self.provider.patch_resource();
                match (prior, planned) {
                    (None, Some(planned)) => resource.create(planned).await.into(),
                    (Some(prior), None) => resource.delete(prior).await.into(),
                    (Some(_), Some(planned)) => resource.update(planned).await.into(),
                    (None, None) => Response::default(),
                }
            }
            Request::ReadResource(p) => {
                if let Err(response) = check_type(&p.type_name) {
                    return response;
                }
                match decode_state(Some(p.current_state)) {
                    Ok(Some(state)) => self.provider.patch_resource().read(state).await.into(),
                    Ok(None) => Response::default(),
                    Err(response) => response,
                }
            }
            Request::ImportResourceState(p) => match check_type(&p.type_name) {
                Err(response) => response,
                Ok(()) => self.provider.patch_resource().import_state(&p.id).into(),
            },
            Request::Stop => Response::default(),
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> std::io::Result<()> {
    let mut out = serde_json::to_vec(response)?;
    out.push(b'\n');
    writer.write_all(&out).await?;
    writer.flush().await
}

/// Provider schema and the schema of every resource type, keyed by type name
pub fn schemas() -> Value {
    json!({
        "provider": KubePatchProvider::schema(),
        "resource_schemas": { (PATCH_RESOURCE_TYPE_NAME): PatchResource::schema() },
    })
}

fn check_type(type_name: &str) -> Result<(), Response> {
    if type_name == PATCH_RESOURCE_TYPE_NAME {
        Ok(())
    } else {
        Err(Response::error(
            "Unknown resource type",
            format!("The provider does not serve a resource named {type_name:?}."),
        ))
    }
}

fn decode_state(value: Option<Value>) -> Result<Option<PatchResourceModel>, Response> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => PatchResourceModel::from_value(value)
            .map(Some)
            .map_err(|err| Response::error("Invalid resource state", err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use http::{Request as HttpRequest, Response as HttpResponse};
    use kube::{client::Body, Client};
    use std::time::Duration;

    async fn run(server: &mut Server, input: &str) -> Vec<Response> {
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn model() -> Value {
        json!({
            "namespace": "default",
            "resource": "deployments",
            "name": "web",
            "type": "merge",
            "data": "{\"spec\":{\"replicas\":2}}",
            "id": null,
        })
    }

    #[tokio::test]
    async fn metadata_and_schema() {
        let mut server = Server::new(KubePatchProvider::new("1.0.0"));
        let responses = run(
            &mut server,
            "{\"method\":\"get_metadata\"}\n{\"method\":\"get_schema\",\"params\":{}}\n",
        )
        .await;
        assert_eq!(responses.len(), 2);
        assert_json_include!(
            actual: &responses[0].result,
            expected: json!({"type_name": "kubepatch", "version": "1.0.0", "resources": ["kubepatch_patch"]})
        );
        let schema = &responses[1].result;
        assert_eq!(schema, &schemas());
        assert_eq!(schema["provider"]["attributes"]["token"]["sensitive"], true);
        assert_eq!(
            schema["resource_schemas"]["kubepatch_patch"]["attributes"]["id"]["computed"],
            true
        );
    }

    #[tokio::test]
    async fn malformed_lines_keep_serving() {
        let mut server = Server::new(KubePatchProvider::new("1.0.0"));
        let input = "not json\n\n{\"method\":\"launch\"}\n{\"method\":\"read_resource\",\"params\":{}}\n{\"method\":\"stop\"}\n{\"method\":\"get_metadata\"}\n";
        let responses = run(&mut server, input).await;
        // the request after stop is never answered
        assert_eq!(responses.len(), 4);
        for response in &responses[..3] {
            assert!(response.diagnostics.has_error());
            assert_eq!(response.result, Value::Null);
        }
        assert_eq!(responses[3], Response::default());
        assert!(matches!(Request::parse("{\"method\":\"launch\"}"), Err(Error::UnknownMethod(m)) if m == "launch"));
    }

    #[tokio::test]
    async fn non_utf8_line_keeps_serving() {
        let mut server = Server::new(KubePatchProvider::new("1.0.0"));
        let mut input = b"{\"method\":\"get_metadata\"}\n".to_vec();
        input.extend_from_slice(b"{\"method\":\"get_\xff\xfe\"}\n");
        input.extend_from_slice(b"{\"method\":\"get_metadata\"}\n");
        let mut output = Vec::new();
        server.serve(input.as_slice(), &mut output).await.unwrap();
        let responses: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].result["type_name"], "kubepatch");
        assert_eq!(responses[1].diagnostics.iter().next().unwrap().summary, "Invalid request");
        assert_eq!(responses[1].result, Value::Null);
        assert_eq!(responses[2], responses[0]);
    }

    #[tokio::test]
    async fn resource_requests_check_type_name() {
        let mut server = Server::new(KubePatchProvider::new("1.0.0"));
        let request = Request::ImportResourceState(ImportParams {
            type_name: "kubernetes_manifest".into(),
            id: "default/pods/a".into(),
        });
        let response = server.handle(request).await;
        assert_eq!(response.diagnostics.iter().next().unwrap().summary, "Unknown resource type");
    }

    #[tokio::test]
    async fn validate_plan_and_import() {
        let mut server = Server::new(KubePatchProvider::new("1.0.0"));
        let input = [
            json!({"method": "validate_provider_config", "params": {"config": {"insecure": "yes"}}}),
            json!({"method": "validate_resource_config", "params": {"type_name": "kubepatch_patch", "config": model()}}),
            json!({"method": "plan_resource_change", "params": {"type_name": "kubepatch_patch", "proposed_state": model()}}),
            json!({"method": "import_resource_state", "params": {"type_name": "kubepatch_patch", "id": "ops/cronjobs/nightly"}}),
        ]
        .iter()
        .map(|r| format!("{r}\n"))
        .collect::<String>();
        let responses = run(&mut server, &input).await;

        assert!(responses[0].diagnostics.has_error());
        assert!(responses[1].diagnostics.is_empty());
        assert_eq!(responses[2].result["id"], Value::Null);
        assert_eq!(responses[2].result["name"], "web");
        assert_json_include!(
            actual: &responses[3].result,
            expected: json!({"namespace": "ops", "resource": "cronjobs", "name": "nightly", "id": "ops/cronjobs/nightly"})
        );
    }

    #[tokio::test]
    async fn apply_without_configure_is_unconfigured() {
        let mut server = Server::new(KubePatchProvider::new("1.0.0"));
        let request = Request::ApplyResourceChange(ApplyParams {
            type_name: "kubepatch_patch".into(),
            prior_state: None,
            planned_state: Some(model()),
        });
        let response = server.handle(request).await;
        assert_eq!(response.diagnostics.iter().next().unwrap().summary, "Unconfigured client");
    }

    #[tokio::test]
    async fn apply_create_and_delete() {
        let (mock_service, mut handle) = tower_test::mock::pair::<HttpRequest<Body>, HttpResponse<Body>>();
        let provider = KubePatchProvider::with_client("1.0.0", Client::new(mock_service, "default"));
        let mut server = Server::new(provider);
        let mocksrv = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::PATCH);
            assert_eq!(request.uri().path(), "/apis/apps/v1/namespaces/default/deployments/web");
            let body = json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "web"}});
            send.send_response(
                HttpResponse::builder()
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            );
        });

        let created = server
            .handle(Request::ApplyResourceChange(ApplyParams {
                type_name: "kubepatch_patch".into(),
                prior_state: None,
                planned_state: Some(model()),
            }))
            .await;
        assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);
        assert_eq!(created.result["id"], "default/deployments/web");

        let deleted = server
            .handle(Request::ApplyResourceChange(ApplyParams {
                type_name: "kubepatch_patch".into(),
                prior_state: Some(created.result),
                planned_state: None,
            }))
            .await;
        assert_eq!(deleted, Response::default());

        tokio::time::timeout(Duration::from_secs(1), mocksrv)
            .await
            .expect("timeout on mock apiserver")
            .expect("scenario succeeded");
    }
}
