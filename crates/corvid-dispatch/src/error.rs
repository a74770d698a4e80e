//! Error types for the dispatch engine.

use thiserror::Error;

/// Errors that can occur while building or firing the dispatch trees.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Name is outside the recognized event set, or fired with no binding.
    /// Raised once per name when firing; binding always fails loudly.
    #[error("Unknown event `{name}` in `{signature}`")]
    UnknownEvent {
        /// The event name that failed to resolve.
        name: String,
        /// Signature of the registry the name was looked up in.
        signature: String,
    },

    /// A leaf was bound a second time.
    #[error("Leaf `{signature}` is already bound to `{name}`")]
    AlreadyBound {
        /// The name the leaf is already bound to.
        name: String,
        /// Signature of the offending leaf.
        signature: String,
    },

    /// Two distinct leaves claim the same command name for the same target id.
    #[error(
        "Command `{name}` for target {target_id} conflicts: `{existing}` vs `{incoming}`"
    )]
    CommandConflict {
        /// The contested command name.
        name: String,
        /// The target id both leaves claim.
        target_id: u64,
        /// Signature of the leaf already registered.
        existing: String,
        /// Signature of the leaf being registered.
        incoming: String,
    },

    /// A handler was attached without any resolvable node name.
    #[error("Binding in `{0}` has no resolvable name")]
    UnnamedBinding(String),

    /// A command name was fired with no bound leaf anywhere in scope.
    #[error("Command `{name}` has no binding in `{signature}`")]
    UnboundCommand {
        /// The command name that failed to resolve.
        name: String,
        /// Signature of the registry the name was fired on.
        signature: String,
    },

    /// Mutually exclusive or otherwise invalid attribute inputs.
    #[error("Invalid attributes: {0}")]
    InvalidAttribute(String),

    /// A subtree was attached while it already had a parent.
    #[error("Node `{0}` is already attached to a parent")]
    AlreadyAttached(String),

    /// A leaf handler failed; propagated out of `fire` unmodified in meaning.
    #[error("Handler `{signature}` failed: {source}")]
    Handler {
        /// Signature of the failing leaf.
        signature: String,
        /// The underlying handler error.
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
