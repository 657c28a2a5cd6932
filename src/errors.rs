//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`KilnError`] separates failures by how the caller is
//! expected to react:
//!
//! | Variant | Severity | Surfaced by |
//! |---------|----------|-------------|
//! | [`KilnError::Configuration`] | fatal for the call | returned synchronously |
//! | [`KilnError::Compile`] | recoverable | material diagnostics, never returned by `render` |
//! | [`KilnError::DeviceLost`] | fatal for the frame | returned when restoration fails |
//! | [`KilnError::ReadbackTimeout`] | recoverable | the readback future |
//! | [`KilnError::ReadbackAbandoned`] | recoverable | the readback future |
//!
//! Resource warnings (oversized textures, missing attributes the shader can
//! live without) are not errors. They are logged once through
//! [`crate::utils::warn_once`] and counted in the frame statistics.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, KilnError>`.

use std::fmt::{self, Write as _};

use thiserror::Error;

/// The main error type for the renderer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KilnError {
    // ========================================================================
    // Caller errors
    // ========================================================================
    /// Invalid resource or renderer configuration.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    // ========================================================================
    // Program errors
    // ========================================================================
    /// A shader program failed to compile or link.
    #[error("Program compile error: {0}")]
    Compile(ProgramDiagnostics),

    // ========================================================================
    // Device errors
    // ========================================================================
    /// The device context was lost and could not be restored.
    #[error("GPU device lost")]
    DeviceLost,

    /// Failed to acquire an adapter or device for the wgpu backend.
    #[error("Failed to initialise GPU device: {0}")]
    DeviceInit(String),

    // ========================================================================
    // Readback
    // ========================================================================
    /// The readback fence did not signal within the attempt budget.
    #[error("Pixel readback timed out after {attempts} polls")]
    ReadbackTimeout {
        /// Number of polls performed before giving up
        attempts: u32,
    },

    /// The device reported a failure while mapping the readback buffer.
    #[error("Pixel readback failed: {0}")]
    ReadbackFailed(String),

    /// The device was lost while the readback was pending.
    #[error("Pixel readback abandoned: the device was lost")]
    ReadbackAbandoned,
}

/// Caller-side configuration mistakes.
///
/// These are raised synchronously and abort the current operation. The
/// resource or renderer state involved is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A fixed-layout buffer changed its byte size after first upload.
    #[error(
        "Buffer {id} changed size after upload ({expected} -> {actual} bytes); dispose and recreate it instead"
    )]
    BufferResized {
        /// Resource id of the offending buffer
        id: u64,
        /// Size recorded at first upload
        expected: usize,
        /// Size found on this update
        actual: usize,
    },

    /// Shadow parameters that cannot produce a shadow map.
    #[error("Invalid shadow configuration: {0}")]
    InvalidShadowConfiguration(String),

    /// Projection parameters that cannot produce a projection matrix.
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    /// An enum-typed setting received a value outside its domain.
    #[error("Invalid {kind} value: {value}")]
    InvalidEnum {
        /// Name of the setting
        kind: &'static str,
        /// The rejected raw value
        value: u32,
    },

    /// A geometry lacks an attribute every program requires.
    #[error("Geometry is missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Attribute name
        attribute: &'static str,
    },

    /// A render target that cannot be created or bound.
    #[error("Invalid render target: {0}")]
    InvalidRenderTarget(String),
}

/// Shader stage that produced a compile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Module-level failure (parse errors, link/validation errors).
    Module,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Module => "module",
        })
    }
}

/// Compile or link failure of one program, with enough source context to
/// locate the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDiagnostics {
    /// Debug label of the program (material family and key hash).
    pub program: String,
    pub stage: ShaderStage,
    /// Raw message reported by the device.
    pub message: String,
    /// 1-based line of the failure, when the device reported one.
    pub line: Option<u32>,
    /// Line-numbered source excerpt around `line`.
    pub excerpt: String,
}

impl ProgramDiagnostics {
    /// Lines of context shown on each side of the failing line.
    const CONTEXT_LINES: u32 = 3;

    /// Builds diagnostics with a numbered excerpt taken from `source`.
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        stage: ShaderStage,
        message: impl Into<String>,
        line: Option<u32>,
        source: &str,
    ) -> Self {
        let excerpt = match line {
            Some(line) => numbered_excerpt(source, line, Self::CONTEXT_LINES),
            None => String::new(),
        };
        Self {
            program: program.into(),
            stage,
            message: message.into(),
            line,
            excerpt,
        }
    }
}

impl fmt::Display for ProgramDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} stage: {}", self.program, self.stage, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        if !self.excerpt.is_empty() {
            write!(f, "\n{}", self.excerpt)?;
        }
        Ok(())
    }
}

/// Returns `source` lines `line - context ..= line + context`, each prefixed
/// with its 1-based number. The failing line is marked with `>`.
#[must_use]
pub fn numbered_excerpt(source: &str, line: u32, context: u32) -> String {
    let first = line.saturating_sub(context).max(1);
    let last = line.saturating_add(context);
    let mut out = String::new();
    for (idx, text) in source.lines().enumerate() {
        let number = idx as u32 + 1;
        if number < first {
            continue;
        }
        if number > last {
            break;
        }
        let marker = if number == line { '>' } else { ' ' };
        let _ = writeln!(out, "{marker}{number:5}: {text}");
    }
    out
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_marks_failing_line_and_clamps_start() {
        let source = "a\nb\nc\nd\ne\nf\ng";
        let excerpt = numbered_excerpt(source, 2, 1);
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(": a"));
        assert!(lines[1].starts_with('>'));
        assert!(lines[1].ends_with(": b"));
    }

    #[test]
    fn excerpt_clamps_at_end_of_source() {
        let excerpt = numbered_excerpt("x\ny", 2, 5);
        assert_eq!(excerpt.lines().count(), 2);
    }

    #[test]
    fn configuration_error_converts() {
        let err: KilnError = ConfigurationError::InvalidEnum {
            kind: "coordinate system",
            value: 9,
        }
        .into();
        assert!(matches!(err, KilnError::Configuration(_)));
        assert!(err.to_string().contains("coordinate system"));
    }
}
