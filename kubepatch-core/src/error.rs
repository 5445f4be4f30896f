use thiserror::Error;

/// Possible errors when interpreting provider or resource input
#[derive(Error, Debug)]
pub enum Error {
    /// The resource string is not in the dispatch table
    #[error("unknown resource kind: {0}")]
    UnknownResourceKind(String),

    /// The patch type is not one of json, merge or strategic
    #[error("unknown patch type: {0}, expected one of [json merge strategic]")]
    UnknownPatchType(String),

    /// A `json` patch body that is not an RFC 6902 operation list
    #[error("invalid JSON patch: {0}")]
    InvalidJsonPatch(#[source] serde_json::Error),

    /// A `merge` or `strategic` patch body that is not JSON
    #[error("invalid patch body: {0}")]
    InvalidPatchBody(#[source] serde_json::Error),

    /// An id that does not have the `namespace/resource/name` form
    #[error("invalid resource id {0:?}, expected namespace/resource/name")]
    InvalidResourceId(String),

    /// Configuration or state that does not decode into its model
    #[error("invalid model: {0}")]
    InvalidModel(#[source] serde_json::Error),
}
