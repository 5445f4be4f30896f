//! The `kubepatch_patch` resource lifecycle
//!
//! A patch has no object of its own: creating and updating it patches an existing object,
//! reading it checks the object is still there, and deleting it only forgets the state.
use kube::Client;
use kubepatch_core::{
    schema, AttributePath, Diagnostic, Diagnostics, PatchResourceModel, PatchTarget, ResourceId, ResourceKind,
    Schema,
};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{dispatch, Error};

/// New state and diagnostics of a lifecycle operation
///
/// A `None` state after [`PatchResource::read`] or [`PatchResource::delete`] removes the resource from state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceResponse {
    /// State to record
    pub state: Option<PatchResourceModel>,
    /// Problems found along the way
    pub diagnostics: Diagnostics,
}

impl ResourceResponse {
    fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            state: None,
            diagnostics: diagnostic.into(),
        }
    }

    fn with_state(state: PatchResourceModel) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Applies a declared patch to an existing object
#[derive(Clone)]
pub struct PatchResource {
    client: Option<Client>,
}

impl PatchResource {
    /// Resource type name
    pub const TYPE_NAME: &'static str = "kubepatch_patch";

    /// A resource using `client`, or an unconfigured one
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }

    /// Whether a client is available
    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Schema of the resource
    pub fn schema() -> Schema {
        schema::patch_resource_schema()
    }

    /// Check a resource configuration, including that the patch body parses as its declared type
    pub fn validate(&self, config: &Value) -> Diagnostics {
        let mut diagnostics = Self::schema().validate(config);
        if diagnostics.has_error() {
            return diagnostics;
        }
        let result = PatchResourceModel::from_value(config.clone()).and_then(|model| PatchTarget::from_model(&model));
        if let Err(err) = result {
            diagnostics.push(invalid_patch(err));
        }
        diagnostics
    }

    /// Plan a change from `prior` state to the `proposed` configuration
    ///
    /// The id stays known while the patched object stays the same.
    pub fn plan(
        &self,
        prior: Option<&PatchResourceModel>,
        proposed: Option<PatchResourceModel>,
    ) -> Option<PatchResourceModel> {
        let mut planned = proposed?;
        planned.id = prior
            .filter(|prior| same_object(prior, &planned))
            .and_then(|prior| prior.id.clone());
        Some(planned)
    }

    /// Patch the object and record the new state
    pub async fn create(&self, plan: PatchResourceModel) -> ResourceResponse {
        trace!(resource = Self::TYPE_NAME, "create");
        self.apply(plan).await
    }

    /// Patch the object again with the updated plan
    pub async fn update(&self, plan: PatchResourceModel) -> ResourceResponse {
        trace!(resource = Self::TYPE_NAME, "update");
        self.apply(plan).await
    }

    async fn apply(&self, mut plan: PatchResourceModel) -> ResourceResponse {
        let Some(client) = self.client.clone() else {
            return ResourceResponse::failed(unconfigured());
        };
        let target = match PatchTarget::from_model(&plan) {
            Ok(target) => target,
            Err(err) => return ResourceResponse::failed(invalid_patch(err)),
        };
        if let Err(err) = dispatch::patch(client, &target).await {
            return ResourceResponse::failed(Diagnostic::error(
                "Client Error",
                format!("Unable to patch, got error: {err}"),
            ));
        }
        let id = target.resource_id().to_string();
        debug!(%id, "patched object");
        plan.id = Some(id);
        ResourceResponse::with_state(plan)
    }

    /// Refresh the state
    ///
    /// State is dropped when the patched object no longer exists.
    /// Without a client, or when the lookup fails, the state is kept as is.
    pub async fn read(&self, state: PatchResourceModel) -> ResourceResponse {
        let Some(client) = self.client.clone() else {
            return ResourceResponse::with_state(state);
        };
        let kind = match state.resource.parse::<ResourceKind>() {
            Ok(kind) => kind,
            Err(err) => {
                let mut response = ResourceResponse::with_state(state);
                response.diagnostics.push(read_failed(Error::Core(err)));
                return response;
            }
        };
        match dispatch::exists(client, kind, &state.namespace, &state.name).await {
            Ok(true) => ResourceResponse::with_state(state),
            Ok(false) => {
                debug!(id = ?state.id, "patched object is gone, removing from state");
                ResourceResponse::default()
            }
            Err(err) => {
                warn!("Unable to read {}/{}: {err}", state.resource, state.name);
                let mut response = ResourceResponse::with_state(state);
                response.diagnostics.push(read_failed(err));
                response
            }
        }
    }

    /// Forget the resource; the object keeps the patched content
    pub async fn delete(&self, state: PatchResourceModel) -> ResourceResponse {
        debug!(id = ?state.id, "removing patch from state, object left as is");
        ResourceResponse::default()
    }

    /// Start tracking an existing patch by id
    pub fn import_state(&self, id: &str) -> ResourceResponse {
        let mut state = PatchResourceModel {
            id: Some(id.to_string()),
            ..Default::default()
        };
        if let Ok(parsed) = id.parse::<ResourceId>() {
            state.namespace = parsed.namespace;
            state.resource = parsed.kind.to_string();
            state.name = parsed.name;
        }
        ResourceResponse::with_state(state)
    }
}

fn same_object(a: &PatchResourceModel, b: &PatchResourceModel) -> bool {
    a.namespace == b.namespace && a.resource == b.resource && a.name == b.name
}

fn unconfigured() -> Diagnostic {
    Diagnostic::error(
        Error::Unconfigured.to_string(),
        "Expected a configured Kubernetes client. The provider configuration may be invalid.",
    )
}

fn read_failed(err: Error) -> Diagnostic {
    Diagnostic::warning("Unable to read patched object", err.to_string())
}

fn invalid_patch(err: kubepatch_core::Error) -> Diagnostic {
    use kubepatch_core::Error as CoreError;
    let attribute = match &err {
        CoreError::UnknownResourceKind(_) => Some("resource"),
        CoreError::UnknownPatchType(_) => Some("type"),
        CoreError::InvalidJsonPatch(_) | CoreError::InvalidPatchBody(_) => Some("data"),
        _ => None,
    };
    let diagnostic = Diagnostic::error("Invalid patch", err.to_string());
    match attribute {
        Some(name) => diagnostic.with_attribute(AttributePath::root(name)),
        None => diagnostic,
    }
}
