use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// API group a [`ResourceKind`] is served from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiGroup {
    /// The legacy core group, served under `/api/v1`
    CoreV1,
    /// `apps/v1`
    AppsV1,
    /// `batch/v1`
    BatchV1,
}

impl ApiGroup {
    /// The `apiVersion` string of the group
    pub fn api_version(&self) -> &'static str {
        match self {
            ApiGroup::CoreV1 => "v1",
            ApiGroup::AppsV1 => "apps/v1",
            ApiGroup::BatchV1 => "batch/v1",
        }
    }
}

macro_rules! resource_kinds {
    ($( $(#[$meta:meta])* $variant:ident => $plural:literal, $group:ident, $namespaced:literal; )*) => {
        /// A Kubernetes resource that a patch can be declared against
        ///
        /// The set is fixed; parsing only accepts the literal plural resource names.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ResourceKind {
            $( $(#[$meta])* $variant, )*
        }

        impl ResourceKind {
            /// Every supported kind, in declaration order
            pub const ALL: &'static [ResourceKind] = &[$( ResourceKind::$variant, )*];

            /// The plural resource name, e.g. `deployments`
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( ResourceKind::$variant => $plural, )*
                }
            }

            /// The group and version the kind is served from
            pub fn api_group(&self) -> ApiGroup {
                match self {
                    $( ResourceKind::$variant => ApiGroup::$group, )*
                }
            }

            /// Whether objects of this kind live inside a namespace
            pub fn is_namespaced(&self) -> bool {
                match self {
                    $( ResourceKind::$variant => $namespaced, )*
                }
            }
        }

        impl FromStr for ResourceKind {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $plural => Ok(ResourceKind::$variant), )*
                    other => Err(Error::UnknownResourceKind(other.to_string())),
                }
            }
        }
    };
}

resource_kinds! {
    /// `bindings`; accepted by the schema but has no patch endpoint
    Bindings => "bindings", CoreV1, true;
    /// `componentstatuses`
    ComponentStatuses => "componentstatuses", CoreV1, false;
    /// `configmaps`
    ConfigMaps => "configmaps", CoreV1, true;
    /// `endpoints`
    Endpoints => "endpoints", CoreV1, true;
    /// `events`
    Events => "events", CoreV1, true;
    /// `limitranges`
    LimitRanges => "limitranges", CoreV1, true;
    /// `namespaces`
    Namespaces => "namespaces", CoreV1, false;
    /// `nodes`
    Nodes => "nodes", CoreV1, false;
    /// `persistentvolumeclaims`
    PersistentVolumeClaims => "persistentvolumeclaims", CoreV1, true;
    /// `persistentvolumes`
    PersistentVolumes => "persistentvolumes", CoreV1, false;
    /// `pods`
    Pods => "pods", CoreV1, true;
    /// `podtemplates`
    PodTemplates => "podtemplates", CoreV1, true;
    /// `replicationcontrollers`
    ReplicationControllers => "replicationcontrollers", CoreV1, true;
    /// `resourcequotas`
    ResourceQuotas => "resourcequotas", CoreV1, true;
    /// `secrets`
    Secrets => "secrets", CoreV1, true;
    /// `serviceaccounts`
    ServiceAccounts => "serviceaccounts", CoreV1, true;
    /// `services`
    Services => "services", CoreV1, true;
    /// `controllerrevisions`
    ControllerRevisions => "controllerrevisions", AppsV1, true;
    /// `daemonsets`
    DaemonSets => "daemonsets", AppsV1, true;
    /// `deployments`
    Deployments => "deployments", AppsV1, true;
    /// `replicasets`
    ReplicaSets => "replicasets", AppsV1, true;
    /// `statefulsets`
    StatefulSets => "statefulsets", AppsV1, true;
    /// `cronjobs`
    CronJobs => "cronjobs", BatchV1, true;
    /// `jobs`
    Jobs => "jobs", BatchV1, true;
}

impl ResourceKind {
    /// The plural names of [`ResourceKind::ALL`], as used by the schema validator
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(ResourceKind::as_str).collect()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_listed_kind() {
        assert_eq!(ResourceKind::ALL.len(), 24);
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn rejects_near_misses() {
        for bad in ["Deployments", "deployment", " pods", "ingresses", ""] {
            assert!(matches!(
                bad.parse::<ResourceKind>(),
                Err(Error::UnknownResourceKind(s)) if s == bad
            ));
        }
    }

    #[test]
    fn cluster_scoped_kinds() {
        let cluster_scoped: Vec<_> = ResourceKind::ALL
            .iter()
            .filter(|k| !k.is_namespaced())
            .map(ResourceKind::as_str)
            .collect();
        assert_eq!(cluster_scoped, vec![
            "componentstatuses",
            "namespaces",
            "nodes",
            "persistentvolumes"
        ]);
    }

    #[test]
    fn groups_follow_the_table() {
        assert_eq!(ResourceKind::Secrets.api_group(), ApiGroup::CoreV1);
        assert_eq!(ResourceKind::StatefulSets.api_group().api_version(), "apps/v1");
        assert_eq!(ResourceKind::CronJobs.api_group().api_version(), "batch/v1");
    }

    #[test]
    fn serde_uses_plural_names() {
        let kind: ResourceKind = serde_json::from_str(r#""replicationcontrollers""#).unwrap();
        assert_eq!(kind, ResourceKind::ReplicationControllers);
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""replicationcontrollers""#);
        assert!(serde_json::from_str::<ResourceKind>(r#""widgets""#).is_err());
    }
}
