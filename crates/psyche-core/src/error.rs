use thiserror::Error;

#[derive(Debug, Error)]
pub enum PsycheError {
    // Chain definition errors
    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Chain already exists: {0}")]
    DuplicateChain(String),

    #[error("Unknown node '{node_id}' in chain '{chain_id}'")]
    UnknownNode { chain_id: String, node_id: String },

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    // Agent errors
    #[error("Agent class not registered: {0}")]
    AgentClassNotRegistered(String),

    #[error("Agent initialization failed: {agent}: {message}")]
    AgentInitialization { agent: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent execution failed: {agent}: {message}")]
    AgentExecution { agent: String, message: String },

    // Serialization errors
    #[error("Unsupported chain format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {format} chain: {message}")]
    Parse { format: String, message: String },

    #[error("Failed to serialize chain: {0}")]
    Serialize(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Session errors
    #[error("Session store error: {0}")]
    Session(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PsycheError {
    /// Whether this error is raised before any node runs.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            PsycheError::ChainNotFound(_)
                | PsycheError::UnknownNode { .. }
                | PsycheError::InvalidChain(_)
                | PsycheError::AgentClassNotRegistered(_)
                | PsycheError::AgentInitialization { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PsycheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_classification() {
        assert!(PsycheError::ChainNotFound("c".into()).is_setup_error());
        assert!(PsycheError::InvalidChain("cycle".into()).is_setup_error());
        assert!(!PsycheError::InvalidInput("empty".into()).is_setup_error());
        assert!(!PsycheError::Serialize("x".into()).is_setup_error());
    }

    #[test]
    fn test_error_messages() {
        let err = PsycheError::UnknownNode {
            chain_id: "assessment".into(),
            node_id: "ghost".into(),
        };
        assert_eq!(err.to_string(), "Unknown node 'ghost' in chain 'assessment'");
    }
}
