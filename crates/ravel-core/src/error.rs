pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced through the public API.
///
/// Problems inside a document (bad references, cycles, failed expansions) are not errors: they
/// degrade to neutral values and are reported as [`Diagnostic`](crate::Diagnostic)s.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown component type: {component_type}")]
    UnknownComponentType { component_type: String },

    #[error("Component type registered twice: {component_type}")]
    DuplicateComponentType { component_type: String },

    #[error("Component type {component_type} declares state variable {variable} more than once")]
    DuplicateStateVariable {
        component_type: String,
        variable: String,
    },

    #[error("Unknown node: {node}")]
    UnknownNode { node: String },

    #[error("Component type {component_type} has no state variable {variable}")]
    UnknownStateVariable {
        component_type: String,
        variable: String,
    },

    #[error("Invalid node tree: {message}")]
    InvalidTree { message: String },

    #[error("Invalid essential value export: {message}")]
    InvalidEssentialValues { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
