//! Patch parameters derived from a declared resource
use std::{fmt, str::FromStr};

use kube_core::params::Patch;
use serde_json::Value;

use crate::{Error, PatchResourceModel, ResourceKind, Result};

/// The patch strategies the API server accepts through a `PATCH` request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatchType {
    /// [JSON patch](https://tools.ietf.org/html/rfc6902), a list of operations
    Json,
    /// [JSON merge patch](https://tools.ietf.org/html/rfc7386)
    Merge,
    /// Strategic merge patch, aware of list merge keys of built-in types
    Strategic,
}

impl PatchType {
    /// Every patch type, in the order the schema lists them
    pub const ALL: &'static [PatchType] = &[PatchType::Json, PatchType::Merge, PatchType::Strategic];

    /// The attribute value naming this patch type
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchType::Json => "json",
            PatchType::Merge => "merge",
            PatchType::Strategic => "strategic",
        }
    }

    /// The `Content-Type` of a request carrying this patch type
    pub fn content_type(&self) -> &'static str {
        match self {
            PatchType::Json => "application/json-patch+json",
            PatchType::Merge => "application/merge-patch+json",
            PatchType::Strategic => "application/strategic-merge-patch+json",
        }
    }

    /// Parse a patch body into the [`Patch`] for this type
    pub fn into_patch(self, data: &str) -> Result<Patch<Value>> {
        match self {
            PatchType::Json => {
                let ops: json_patch::Patch = serde_json::from_str(data).map_err(Error::InvalidJsonPatch)?;
                Ok(Patch::Json(ops))
            }
            PatchType::Merge => Ok(Patch::Merge(
                serde_json::from_str(data).map_err(Error::InvalidPatchBody)?,
            )),
            PatchType::Strategic => Ok(Patch::Strategic(
                serde_json::from_str(data).map_err(Error::InvalidPatchBody)?,
            )),
        }
    }
}

impl FromStr for PatchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(PatchType::Json),
            "merge" => Ok(PatchType::Merge),
            "strategic" => Ok(PatchType::Strategic),
            other => Err(Error::UnknownPatchType(other.to_string())),
        }
    }
}

impl fmt::Display for PatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated patch request: which object to patch and with what
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchTarget {
    /// Namespace of the object; unused for cluster scoped kinds
    pub namespace: String,
    /// Kind of the object
    pub kind: ResourceKind,
    /// Name of the object
    pub name: String,
    /// How `data` is interpreted
    pub patch_type: PatchType,
    /// The raw patch body
    pub data: String,
}

impl PatchTarget {
    /// Validate a declared resource
    ///
    /// Fails when the resource or type is not recognised, or when the body does not parse as the declared patch type.
    pub fn from_model(model: &PatchResourceModel) -> Result<Self> {
        let kind = model.resource.parse()?;
        let patch_type: PatchType = model.patch_type.parse()?;
        patch_type.into_patch(&model.data)?;
        Ok(Self {
            namespace: model.namespace.clone(),
            kind,
            name: model.name.clone(),
            patch_type,
            data: model.data.clone(),
        })
    }

    /// The [`Patch`] to send
    pub fn patch(&self) -> Result<Patch<Value>> {
        self.patch_type.into_patch(&self.data)
    }

    /// Identifier recorded in state for this target
    pub fn resource_id(&self) -> ResourceId {
        ResourceId {
            namespace: self.namespace.clone(),
            kind: self.kind,
            name: self.name.clone(),
        }
    }
}

/// Identifier of a patched object, rendered as `namespace/resource/name`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceId {
    /// Namespace of the object
    pub namespace: String,
    /// Kind of the object
    pub kind: ResourceKind,
    /// Name of the object
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(kind), Some(name), None) if !name.is_empty() => Ok(Self {
                namespace: namespace.to_string(),
                kind: kind.parse()?,
                name: name.to_string(),
            }),
            _ => Err(Error::InvalidResourceId(s.to_string())),
        }
    }
}
