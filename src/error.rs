//! Typed error surface for the core. Structural and configuration errors
//! are returned here; transient data errors are rejected at the
//! transaction boundary and never partially mutate state (see §7).

use thiserror::Error;

use crate::model::NodePath;

/// Errors produced by the document model, operation algebra, OT engine,
/// and plugin/command registries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// `path` does not address a node in the document it was applied to.
    #[error("invalid path {path:?}: {message}")]
    InvalidPath { path: NodePath, message: String },

    /// A text range (`offset`/`length`) falls outside the addressed
    /// block's text.
    #[error("invalid range at offset {offset} (len {length}): {message}")]
    InvalidRange {
        offset: usize,
        length: usize,
        message: String,
    },

    /// A plugin declared a dependency cycle.
    #[error("cyclic dependency detected among plugins: {cycle:?}")]
    CyclicDependency { cycle: Vec<String> },

    /// A plugin declared a dependency on a name that was never registered.
    #[error("plugin '{dependent}' depends on unknown plugin '{dependency}'")]
    UnknownPlugin { dependent: String, dependency: String },

    /// A plugin (or command) name was registered twice.
    #[error("'{name}' is already registered")]
    AlreadyRegistered { name: String },

    /// A plugin was registered after `PluginRegistry::init_all` already
    /// ran. Registration locks the first time every plugin's `on_init` is
    /// invoked in topological order, so the set of plugins is fixed for
    /// the lifetime of the registry from that point on (§4.7).
    #[error("'{name}' cannot be registered: the plugin registry is locked")]
    Locked { name: String },

    /// A command name was registered twice.
    #[error("command '{name}' is already registered")]
    DuplicateCommand { name: String },

    /// Diagnostic only, never returned from `transform`: the engine saw
    /// an op pair it has no explicit rule for and passed both through
    /// unchanged (§7, §4.2).
    #[error("transform saw an unrecognised op pair: {reason}")]
    TransformFailure { reason: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
