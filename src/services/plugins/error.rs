//! Plugin Runtime Errors
//!
//! Typed failures for the sandboxed module loader and the plugin lifecycle.
//! Nothing in the plugin runtime is allowed to panic across its boundary;
//! every failure mode of untrusted plugin code maps to one of these.

use thiserror::Error;

/// Error type for the plugin runtime.
#[derive(Error, Debug)]
pub enum PluginError {
    /// The plugin imported a module the sandbox does not resolve
    #[error("Unknown import: {0}")]
    UnknownImport(String),

    /// Missing or malformed activate/deactivate exports
    #[error("Invalid plugin contract: {0}")]
    InvalidPluginContract(String),

    /// The plugin source failed to parse or its top-level code threw
    #[error("Plugin evaluation failed: {0}")]
    Evaluation(String),

    /// A lifecycle or capability call into loaded plugin code failed
    #[error("Plugin runtime error: {0}")]
    Runtime(String),

    /// Operation requires a loaded module but none is present
    #[error("Plugin module not loaded")]
    NotLoaded,

    /// A host bridge call failed. The display string is the only detail
    /// plugin code ever sees.
    #[error("Host call failed")]
    HostBridge,

    /// Plugin not found in the backend or manager
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// Manifest or settings file could not be parsed
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// File I/O errors (backend discovery, settings persistence)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for plugin runtime operations
pub type PluginResult<T> = Result<T, PluginError>;
