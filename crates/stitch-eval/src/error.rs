//! Interpreter failures.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A `throw` reached the caller; carries the thrown value as text.
    #[error("exception: {0}")]
    Thrown(String),
    #[error("null receiver calling `{0}`")]
    NullReceiver(String),
    #[error("class `{class}` has no member `{name}` taking {arity} argument(s)")]
    UnknownMember {
        class: String,
        name: String,
        arity: usize,
    },
    #[error("`{0}` has no implementation")]
    Abstract(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("missing argument `{param}` calling `{function}`")]
    MissingArgument { function: String, param: String },
    #[error("lazy value read during its own initialisation")]
    RecursiveLazy,
}

impl EvalError {
    pub fn thrown_message(&self) -> Option<&str> {
        match self {
            EvalError::Thrown(message) => Some(message),
            _ => None,
        }
    }
}
