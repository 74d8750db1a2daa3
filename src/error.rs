use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    StoreError(String),
    StateTransitionError(String),
    OrchestrationError(String),
    TemplateError(String),
    RegistryError(String),
    ContextError(String),
    EventError(String),
    ValidationError(String),
    ConfigurationError(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::StoreError(msg) => write!(f, "Store error: {msg}"),
            EngineError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            EngineError::OrchestrationError(msg) => write!(f, "Orchestration error: {msg}"),
            EngineError::TemplateError(msg) => write!(f, "Template error: {msg}"),
            EngineError::RegistryError(msg) => write!(f, "Registry error: {msg}"),
            EngineError::ContextError(msg) => write!(f, "Context error: {msg}"),
            EngineError::EventError(msg) => write!(f, "Event error: {msg}"),
            EngineError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            EngineError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<crate::store::StoreError> for EngineError {
    fn from(err: crate::store::StoreError) -> Self {
        EngineError::StoreError(err.to_string())
    }
}

impl From<crate::template::TemplateError> for EngineError {
    fn from(err: crate::template::TemplateError) -> Self {
        EngineError::TemplateError(err.to_string())
    }
}

impl From<crate::context::ContextError> for EngineError {
    fn from(err: crate::context::ContextError) -> Self {
        EngineError::ContextError(err.to_string())
    }
}

impl From<crate::state_machine::StateMachineError> for EngineError {
    fn from(err: crate::state_machine::StateMachineError) -> Self {
        EngineError::StateTransitionError(err.to_string())
    }
}

impl From<crate::events::PublishError> for EngineError {
    fn from(err: crate::events::PublishError) -> Self {
        EngineError::EventError(err.to_string())
    }
}
