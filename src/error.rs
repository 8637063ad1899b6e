use std::fmt;

use thiserror::Error;

/// The four recoverable failure kinds of method reconstruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Simulation,
    Structuring,
    Resolution,
    UnsupportedPattern,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Simulation => "SimulationError",
            FailureKind::Structuring => "StructuringFailure",
            FailureKind::Resolution => "ResolutionError",
            FailureKind::UnsupportedPattern => "UnsupportedPatternError",
        };
        f.write_str(name)
    }
}

/// A failure scoped to one method (or one region of it).
///
/// These never abort a class: the method body is replaced by a raw fallback
/// and the failure is recorded as a [`MethodFailure`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReconstructError {
    #[error("stack simulation failed at offset {offset}: {message}")]
    Simulation { offset: u32, message: String },

    #[error("cannot structure region at offset {offset}: {message}")]
    Structuring { offset: u32, message: String },

    #[error("conflicting types for slot {slot} at offset {offset}: {message}")]
    Resolution { slot: u16, offset: u32, message: String },

    #[error("unsupported pattern at offset {offset}: {message}")]
    UnsupportedPattern { offset: u32, message: String },
}

impl ReconstructError {
    pub fn simulation(offset: u32, message: impl Into<String>) -> Self {
        ReconstructError::Simulation {
            offset,
            message: message.into(),
        }
    }

    pub fn structuring(offset: u32, message: impl Into<String>) -> Self {
        ReconstructError::Structuring {
            offset,
            message: message.into(),
        }
    }

    pub fn resolution(slot: u16, offset: u32, message: impl Into<String>) -> Self {
        ReconstructError::Resolution {
            slot,
            offset,
            message: message.into(),
        }
    }

    pub fn unsupported(offset: u32, message: impl Into<String>) -> Self {
        ReconstructError::UnsupportedPattern {
            offset,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ReconstructError::Simulation { .. } => FailureKind::Simulation,
            ReconstructError::Structuring { .. } => FailureKind::Structuring,
            ReconstructError::Resolution { .. } => FailureKind::Resolution,
            ReconstructError::UnsupportedPattern { .. } => FailureKind::UnsupportedPattern,
        }
    }

    pub fn offset(&self) -> u32 {
        match self {
            ReconstructError::Simulation { offset, .. }
            | ReconstructError::Structuring { offset, .. }
            | ReconstructError::Resolution { offset, .. }
            | ReconstructError::UnsupportedPattern { offset, .. } => *offset,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ReconstructError::Simulation { message, .. }
            | ReconstructError::Structuring { message, .. }
            | ReconstructError::Resolution { message, .. }
            | ReconstructError::UnsupportedPattern { message, .. } => message,
        }
    }
}

/// A recorded failure: what went wrong, and where.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodFailure {
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    pub kind: FailureKind,
    pub offset: u32,
    pub message: String,
    /// False when the body was still reconstructed (goto fallback inside one region).
    pub fell_back: bool,
}

impl MethodFailure {
    pub fn new(class_name: &str, method_name: &str, descriptor: &str, error: &ReconstructError, fell_back: bool) -> Self {
        Self {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
            kind: error.kind(),
            offset: error.offset(),
            message: error.message().to_string(),
            fell_back,
        }
    }
}

impl fmt::Display for MethodFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {}.{}{} at offset {}: {}",
            self.kind, self.class_name, self.method_name, self.descriptor, self.offset, self.message
        )
    }
}

/// Errors that abort a whole request. Malformed input lands here, never in
/// [`ReconstructError`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecompileError {
    #[error("invalid input in {location}: {message}")]
    InvalidInput { location: String, message: String },

    #[error("method '{method}' not found in {class}")]
    MethodNotFound { class: String, method: String },

    #[error("{0}")]
    General(String),
}

impl DecompileError {
    pub fn invalid_input(location: impl Into<String>, message: impl Into<String>) -> Self {
        DecompileError::InvalidInput {
            location: location.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecompileError>;
