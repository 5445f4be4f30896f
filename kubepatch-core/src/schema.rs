//! Declarative schemas for the provider and its resources
//!
//! A [`Schema`] describes the attributes and nested blocks a configuration object may hold.
//! It is handed to the host verbatim, and [`Schema::validate`] checks configuration objects
//! against it before any of them reach the cluster.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::{AttributePath, Diagnostic, Diagnostics, PatchType, ResourceKind};

/// Value type of an [`Attribute`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// A string
    String,
    /// A boolean
    Bool,
    /// A list of the inner type
    List(Box<AttributeType>),
    /// A map from strings to the inner type
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Shorthand for a list of strings
    pub fn string_list() -> Self {
        AttributeType::List(Box::new(AttributeType::String))
    }

    /// Shorthand for a map of strings
    pub fn string_map() -> Self {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => true,
            (AttributeType::Bool, Value::Bool(_)) => true,
            (AttributeType::List(inner), Value::Array(items)) => items.iter().all(|v| inner.matches(v)),
            (AttributeType::Map(inner), Value::Object(map)) => map.values().all(|v| inner.matches(v)),
            _ => false,
        }
    }
}

/// A check applied to a configured attribute value
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    /// The string must be one of the listed values
    OneOf(Vec<String>),
}

impl Validator {
    /// `OneOf` from anything yielding string slices
    pub fn one_of<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        Validator::OneOf(values.into_iter().map(String::from).collect())
    }

    fn check(&self, value: &Value, path: &AttributePath) -> Option<Diagnostic> {
        match self {
            Validator::OneOf(allowed) => {
                let s = value.as_str()?;
                if allowed.iter().any(|a| a == s) {
                    return None;
                }
                Some(
                    Diagnostic::error(
                        "Invalid Attribute Value Match",
                        format!("Attribute {path} value must be one of: {allowed:?}, got: {s:?}"),
                    )
                    .with_attribute(path.clone()),
                )
            }
        }
    }
}

/// How planning treats an attribute
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanModifier {
    /// Carry the prior state value into the plan instead of marking it unknown
    UseStateForUnknown,
}

/// A single attribute of a [`Schema`] or [`Block`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attribute {
    /// Value type
    #[serde(rename = "type")]
    pub ty: AttributeType,
    /// Human readable description, markdown allowed
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Must be set in configuration
    pub required: bool,
    /// May be set in configuration
    pub optional: bool,
    /// Set by the provider
    pub computed: bool,
    /// Hidden from plan output
    pub sensitive: bool,
    /// Warning emitted when the attribute is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
    /// Checks run on configured values
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
    /// Planning behaviour
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_modifiers: Vec<PlanModifier>,
}

impl Attribute {
    fn new(ty: AttributeType) -> Self {
        Self {
            ty,
            description: String::new(),
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            deprecation_message: None,
            validators: vec![],
            plan_modifiers: vec![],
        }
    }

    /// A required attribute
    pub fn required(ty: AttributeType) -> Self {
        Self {
            required: true,
            ..Self::new(ty)
        }
    }

    /// An optional attribute
    pub fn optional(ty: AttributeType) -> Self {
        Self {
            optional: true,
            ..Self::new(ty)
        }
    }

    /// An attribute only the provider sets
    pub fn computed(ty: AttributeType) -> Self {
        Self {
            computed: true,
            ..Self::new(ty)
        }
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as sensitive
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Mark as deprecated
    #[must_use]
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = Some(message.into());
        self
    }

    /// Add a validator
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Add a plan modifier
    #[must_use]
    pub fn plan_modifier(mut self, modifier: PlanModifier) -> Self {
        self.plan_modifiers.push(modifier);
        self
    }

    fn validate(&self, value: Option<&Value>, path: AttributePath, diags: &mut Diagnostics) {
        let value = match value {
            Some(Value::Null) | None => {
                if self.required {
                    diags.push(
                        Diagnostic::error(
                            "Missing required argument",
                            format!("The argument \"{path}\" is required, but no definition was found."),
                        )
                        .with_attribute(path),
                    );
                }
                return;
            }
            Some(v) => v,
        };
        if self.computed && !self.optional && !self.required {
            diags.push(
                Diagnostic::error(
                    "Invalid Configuration for Read-Only Attribute",
                    format!("Cannot set value for attribute \"{path}\", it is computed by the provider."),
                )
                .with_attribute(path),
            );
            return;
        }
        if !self.ty.matches(value) {
            diags.push(
                Diagnostic::error(
                    "Incorrect attribute value type",
                    format!("Attribute \"{path}\" expects a value of type {:?}.", self.ty),
                )
                .with_attribute(path),
            );
            return;
        }
        if let Some(message) = &self.deprecation_message {
            diags.push(Diagnostic::warning("Attribute Deprecated", message.clone()).with_attribute(path.clone()));
        }
        diags.extend(self.validators.iter().filter_map(|v| v.check(value, &path)));
    }
}

/// A repeatable nested block, e.g. `exec { ... }`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Human readable description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Attributes inside each block instance
    pub attributes: BTreeMap<String, Attribute>,
}

impl Block {
    /// An empty block
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }
}

/// Schema of the provider configuration or of a resource
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    /// Schema version, bumped when stored state needs upgrading
    pub version: i64,
    /// Human readable description, markdown allowed
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Top level attributes
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested list blocks
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, Block>,
}

impl Schema {
    /// An empty version 0 schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// Add a nested list block
    #[must_use]
    pub fn block(mut self, name: impl Into<String>, block: Block) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Check a configuration object against this schema
    ///
    /// Every problem found is reported, each with the path of the offending attribute.
    pub fn validate(&self, config: &Value) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(object) = config.as_object() else {
            diags.add_error("Invalid configuration", "Expected the configuration to be an object.");
            return diags;
        };
        validate_object(&self.attributes, &self.blocks, object, None, &mut diags);
        diags
    }
}

fn child(parent: Option<&AttributePath>, name: &str) -> AttributePath {
    match parent {
        Some(p) => p.clone().attribute(name),
        None => AttributePath::root(name),
    }
}

fn validate_object(
    attributes: &BTreeMap<String, Attribute>,
    blocks: &BTreeMap<String, Block>,
    object: &serde_json::Map<String, Value>,
    parent: Option<&AttributePath>,
    diags: &mut Diagnostics,
) {
    for key in object.keys() {
        if !attributes.contains_key(key) && !blocks.contains_key(key) {
            diags.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named \"{key}\" is not expected here."),
                )
                .with_attribute(child(parent, key)),
            );
        }
    }
    for (name, attribute) in attributes {
        attribute.validate(object.get(name), child(parent, name), diags);
    }
    for (name, block) in blocks {
        let path = child(parent, name);
        match object.get(name) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (idx, item) in items.iter().enumerate() {
                    let item_path = path.clone().index(idx);
                    match item.as_object() {
                        Some(inner) => {
                            validate_object(&block.attributes, &BTreeMap::new(), inner, Some(&item_path), diags)
                        }
                        None => diags.push(
                            Diagnostic::error("Invalid block", format!("Block \"{item_path}\" must be an object."))
                                .with_attribute(item_path),
                        ),
                    }
                }
            }
            Some(_) => diags.push(
                Diagnostic::error("Invalid block", format!("Block \"{path}\" must be a list of objects."))
                    .with_attribute(path),
            ),
        }
    }
}

/// Schema of the provider configuration
pub fn provider_schema() -> Schema {
    use AttributeType::Bool;
    let optional_string = |description: &str| Attribute::optional(AttributeType::String).description(description);
    let pattern_list = |what: &str| {
        Attribute::optional(AttributeType::string_list()).description(format!(
            "List of Kubernetes metadata {what} to ignore across all resources handled by this provider \
             for situations where external systems are managing certain resource {what}. \
             Each item is a regular expression."
        ))
    };

    Schema::new()
        .attribute("host", optional_string("The hostname (in form of URI) of Kubernetes master."))
        .attribute(
            "username",
            optional_string(
                "The username to use for HTTP basic authentication when accessing the Kubernetes master endpoint.",
            ),
        )
        .attribute(
            "password",
            optional_string(
                "The password to use for HTTP basic authentication when accessing the Kubernetes master endpoint.",
            )
            .sensitive(),
        )
        .attribute(
            "insecure",
            Attribute::optional(Bool)
                .description("Whether server should be accessed without verifying the TLS certificate."),
        )
        .attribute(
            "tls_server_name",
            optional_string(
                "Server name passed to the server for SNI and is used in the client to check server certificates against.",
            ),
        )
        .attribute(
            "client_certificate",
            optional_string("PEM-encoded client certificate for TLS authentication."),
        )
        .attribute(
            "client_key",
            optional_string("PEM-encoded client certificate key for TLS authentication.").sensitive(),
        )
        .attribute(
            "cluster_ca_certificate",
            optional_string("PEM-encoded root certificates bundle for TLS authentication."),
        )
        .attribute(
            "config_paths",
            Attribute::optional(AttributeType::string_list()).description(
                "A list of paths to kube config files. Can be set with KUBE_CONFIG_PATHS environment variable.",
            ),
        )
        .attribute(
            "config_path",
            optional_string("Path to the kube config file. Can be set with KUBE_CONFIG_PATH."),
        )
        .attribute("config_context", optional_string("Context to use from the kube config."))
        .attribute(
            "config_context_auth_info",
            optional_string("User to use from the kube config, overriding the context."),
        )
        .attribute(
            "config_context_cluster",
            optional_string("Cluster to use from the kube config, overriding the context."),
        )
        .attribute("token", optional_string("Token to authenticate an service account").sensitive())
        .attribute("proxy_url", optional_string("URL to the proxy to be used for all API requests"))
        .attribute("ignore_annotations", pattern_list("annotations"))
        .attribute("ignore_labels", pattern_list("labels"))
        .block(
            "exec",
            Block::new()
                .attribute("api_version", Attribute::required(AttributeType::String))
                .attribute("command", Attribute::required(AttributeType::String))
                .attribute("env", Attribute::optional(AttributeType::string_map()))
                .attribute("args", Attribute::optional(AttributeType::string_list())),
        )
        .block(
            "experiments",
            Block::new()
                .description("Enable and disable experimental features.")
                .attribute(
                    "manifest_resource",
                    Attribute::optional(Bool)
                        .description("Enable the `kubernetes_manifest` resource.")
                        .deprecated(
                            "The kubernetes_manifest resource is now permanently enabled and no longer \
                             considered an experiment. This flag has no effect and will be removed in the near future.",
                        ),
                ),
        )
}

/// Schema of the `kubepatch_patch` resource
pub fn patch_resource_schema() -> Schema {
    Schema::new()
        .description("Applies a patch to a single existing Kubernetes object.")
        .attribute(
            "namespace",
            Attribute::required(AttributeType::String).description("Kubernetes namespace"),
        )
        .attribute(
            "resource",
            Attribute::required(AttributeType::String)
                .description("Kubernetes API resource")
                .validator(Validator::one_of(ResourceKind::names())),
        )
        .attribute(
            "name",
            Attribute::required(AttributeType::String).description("Kubernetes API resource name"),
        )
        .attribute(
            "type",
            Attribute::required(AttributeType::String)
                .description("The type of patch being provided; one of [json merge strategic]")
                .validator(Validator::one_of(PatchType::ALL.iter().map(PatchType::as_str))),
        )
        .attribute(
            "data",
            Attribute::required(AttributeType::String).description("The patch to be applied to the resource JSON file."),
        )
        .attribute(
            "id",
            Attribute::computed(AttributeType::String)
                .description("Identifier of the patched object, `namespace/resource/name`")
                .plan_modifier(PlanModifier::UseStateForUnknown),
        )
}
