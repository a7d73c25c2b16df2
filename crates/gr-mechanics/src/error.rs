//! Error types for the mechanics primitives.

/// Errors that can occur while building or parsing dice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MechError {
    /// A die or pool configuration is invalid.
    #[error("invalid dice: {0}")]
    InvalidDice(String),

    /// A dice expression could not be parsed.
    #[error("invalid dice expression: \"{0}\"")]
    InvalidExpression(String),
}

/// Convenience result type for mechanics operations.
pub type MechResult<T> = Result<T, MechError>;
