//! Error types shared by the compiler, loader and renderer.
//!
//! Every error is `Clone`: one build outcome is broadcast to all waiters
//! registered on a path, so the same value has to reach many futures.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Error
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: Arc<io::Error>,
    },
}

/// Stable discriminant of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Build,
    Load,
    Render,
    Io,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "BuildError",
            Self::Load => "LoadError",
            Self::Render => "RenderError",
            Self::Io => "IoError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Build(_) => ErrorKind::Build,
            Self::Load(_) => ErrorKind::Load,
            Self::Render(_) => ErrorKind::Render,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Diagnostics attached to a build failure, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Build(e) => &e.diagnostics,
            Self::Render(e) => e.cause.as_deref().map_or(&[][..], Error::diagnostics),
            _ => &[],
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One message reported by the build backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn warning(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.path {
            Some(path) => write!(f, "{label}: {}: {}", path.display(), self.message),
            None => write!(f, "{label}: {}", self.message),
        }
    }
}

// ============================================================================
// BuildError
// ============================================================================

/// The backend failed to compile a batch. Every path in the batch fails.
#[derive(Debug, Clone, Error)]
#[error("build failed: {message}")]
pub struct BuildError {
    pub message: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        let message = match diagnostics.iter().find(|d| d.is_error()) {
            Some(first) if errors == 1 => first.to_string(),
            Some(first) => format!("{first} (and {} more)", errors - 1),
            None => "backend reported failure".to_string(),
        };
        Self {
            message,
            diagnostics,
        }
    }
}

// ============================================================================
// LoadError
// ============================================================================

/// A compiled artifact could not be read or evaluated.
#[derive(Debug, Clone, Error)]
#[error("failed to load `{}`: {message}", path.display())]
pub struct LoadError {
    pub path: PathBuf,
    pub message: String,
}

impl LoadError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// RenderError
// ============================================================================

/// Rendering a component failed. Keeps the component and the state it was
/// rendered with.
#[derive(Debug, Clone, Error)]
#[error("failed to render `{}`: {message}", component.display())]
pub struct RenderError {
    pub component: PathBuf,
    pub state: Value,
    pub message: String,
    pub cause: Option<Box<Error>>,
}

impl RenderError {
    pub fn new(component: &Path, state: &Value, cause: Error) -> Self {
        Self {
            component: component.to_path_buf(),
            state: state.clone(),
            message: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Error raised inside the render engine itself.
    pub fn engine(component: &Path, message: impl Into<String>) -> Error {
        Self {
            component: component.to_path_buf(),
            state: Value::Null,
            message: message.into(),
            cause: None,
        }
        .into()
    }

    /// Wrap `cause` for `component`. An existing render error is kept and
    /// only gains the state when it has none yet.
    pub fn wrap(component: &Path, state: &Value, cause: Error) -> Error {
        match cause {
            Error::Render(mut existing) => {
                if existing.state.is_null() {
                    existing.state = state.clone();
                }
                Error::Render(existing)
            }
            other => Self::new(component, state, other).into(),
        }
    }
}
