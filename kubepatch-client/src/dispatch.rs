//! Mapping from [`ResourceKind`] to typed [`Api`] calls
//!
//! Every kind is served through its `k8s-openapi` type, so the request path,
//! group and scope always follow from the declared kind.
use k8s_openapi::{
    api::{apps::v1 as appsv1, batch::v1 as batchv1, core::v1 as corev1},
    NamespaceResourceScope,
};
use kube::{api::PatchParams, Api, Client, Resource};
use kubepatch_core::{PatchTarget, ResourceKind};
use tracing::debug;

use crate::{Error, Result};

fn namespaced<K>(client: Client, namespace: &str) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    if namespace.is_empty() {
        Api::default_namespaced(client)
    } else {
        Api::namespaced(client, namespace)
    }
}

/// Bind `$api` to the typed [`Api`] of `$kind` and evaluate `$body` with it
macro_rules! with_api {
    ($client:expr, $kind:expr, $namespace:expr, |$api:ident| $body:expr) => {{
        let client: Client = $client;
        let namespace: &str = $namespace;
        match $kind {
            ResourceKind::Bindings => Err(Error::UnsupportedKind(ResourceKind::Bindings)),
            ResourceKind::ComponentStatuses => { let $api = Api::<corev1::ComponentStatus>::all(client); $body }
            ResourceKind::ConfigMaps => { let $api = namespaced::<corev1::ConfigMap>(client, namespace); $body }
            ResourceKind::Endpoints => { let $api = namespaced::<corev1::Endpoints>(client, namespace); $body }
            ResourceKind::Events => { let $api = namespaced::<corev1::Event>(client, namespace); $body }
            ResourceKind::LimitRanges => { let $api = namespaced::<corev1::LimitRange>(client, namespace); $body }
            ResourceKind::Namespaces => { let $api = Api::<corev1::Namespace>::all(client); $body }
            ResourceKind::Nodes => { let $api = Api::<corev1::Node>::all(client); $body }
            ResourceKind::PersistentVolumeClaims => {
                let $api = namespaced::<corev1::PersistentVolumeClaim>(client, namespace);
                $body
            }
            ResourceKind::PersistentVolumes => { let $api = Api::<corev1::PersistentVolume>::all(client); $body }
            ResourceKind::Pods => { let $api = namespaced::<corev1::Pod>(client, namespace); $body }
            ResourceKind::PodTemplates => { let $api = namespaced::<corev1::PodTemplate>(client, namespace); $body }
            ResourceKind::ReplicationControllers => {
                let $api = namespaced::<corev1::ReplicationController>(client, namespace);
                $body
            }
            ResourceKind::ResourceQuotas => { let $api = namespaced::<corev1::ResourceQuota>(client, namespace); $body }
            ResourceKind::Secrets => { let $api = namespaced::<corev1::Secret>(client, namespace); $body }
            ResourceKind::ServiceAccounts => { let $api = namespaced::<corev1::ServiceAccount>(client, namespace); $body }
            ResourceKind::Services => { let $api = namespaced::<corev1::Service>(client, namespace); $body }
            ResourceKind::ControllerRevisions => {
                let $api = namespaced::<appsv1::ControllerRevision>(client, namespace);
                $body
            }
            ResourceKind::DaemonSets => { let $api = namespaced::<appsv1::DaemonSet>(client, namespace); $body }
            ResourceKind::Deployments => { let $api = namespaced::<appsv1::Deployment>(client, namespace); $body }
            ResourceKind::ReplicaSets => { let $api = namespaced::<appsv1::ReplicaSet>(client, namespace); $body }
            ResourceKind::StatefulSets => { let $api = namespaced::<appsv1::StatefulSet>(client, namespace); $body }
            ResourceKind::CronJobs => { let $api = namespaced::<batchv1::CronJob>(client, namespace); $body }
            ResourceKind::Jobs => { let $api = namespaced::<batchv1::Job>(client, namespace); $body }
        }
    }};
}

/// Send the patch described by `target`
///
/// The namespace is ignored for cluster scoped kinds. An empty namespace
/// falls back to the client's default namespace.
pub async fn patch(client: Client, target: &PatchTarget) -> Result<()> {
    let patch = target.patch()?;
    let params = PatchParams::default();
    debug!(
        kind = %target.kind,
        namespace = %target.namespace,
        name = %target.name,
        patch_type = %target.patch_type,
        "patching"
    );
    with_api!(client, target.kind, &target.namespace, |api| {
        api.patch(&target.name, &params, &patch)
            .await
            .map(|_| ())
            .map_err(|source| Error::Patch {
                kind: target.kind,
                name: target.name.clone(),
                source,
            })
    })
}

/// Whether the named object exists
pub async fn exists(client: Client, kind: ResourceKind, namespace: &str, name: &str) -> Result<bool> {
    with_api!(client, kind, namespace, |api| {
        api.get_opt(name)
            .await
            .map(|obj| obj.is_some())
            .map_err(|source| Error::Get {
                kind,
                name: name.to_string(),
                source,
            })
    })
}
