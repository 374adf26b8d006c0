use thiserror::Error;

pub type NResult = core::result::Result<(), RuntimeError>;
pub type Result<T> = core::result::Result<T, RuntimeError>;

/// Which external collaborator an [`RuntimeError::IntegrationFailure`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Identity,
    Events,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::Identity => write!(f, "identity service"),
            Collaborator::Events => write!(f, "event directory"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Tried to register a unit type twice.
    /// Raised at startup and never recovered.
    #[error("Unit type already registered: {type_name}")]
    DuplicateRegistration { type_name: String },

    /// Unit type was never registered.
    #[error("Unknown unit type: {type_name}")]
    UnknownType { type_name: String },

    /// Tried to attach under a parent id that has no node.
    #[error("Unknown parent unit: {id}")]
    UnknownParent { id: String },

    /// Unit id is not live.
    #[error("Unknown unit: {id}")]
    UnknownUnit { id: String },

    /// Tried  to invoke an operation with wrong arguments.
    #[error("Invalid argument: {name} - {reason:?}")]
    InvalidArgument {
        name: String,
        reason: Option<String>,
    },

    /// The identity service or event directory failed.
    /// Aborts only the activation of the affected unit.
    #[error("{collaborator} failed for {type_name}: {reason}")]
    IntegrationFailure {
        collaborator: Collaborator,
        type_name: String,
        reason: String,
    },

    /// A unit factory refused to build its unit.
    #[error("Factory for {type_name} failed: {reason}")]
    FactoryFailed { type_name: String, reason: String },

    /// Tree contents are off. Some slot points somewhere it should not.
    #[error("Invalid state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },
}

impl RuntimeError {
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    pub fn integration(
        collaborator: Collaborator,
        type_name: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::IntegrationFailure {
            collaborator,
            type_name: type_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn factory(type_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FactoryFailed {
            type_name: type_name.into(),
            reason: reason.to_string(),
        }
    }
}
