//! Error handling for NetGraph Core.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable code
//! - User-facing messages kept apart from internal diagnostics
//! - Structured details (entity, context, suggested action)
//! - Severity-aware logging through `tracing`
//! - Error counters through the `metrics` facade
//!
//! # Usage
//!
//! ```rust,ignore
//! use netgraph_core::error::{NetError, Result, ErrorContext};
//!
//! fn load() -> Result<()> {
//!     std::fs::read("events.jsonl").context("Failed to read stream file")?;
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for NetGraph operations.
pub type Result<T> = std::result::Result<T, NetError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Write path (1000-1099)
    ConcurrencyConflict,
    ValidationFailed,
    DuplicateElement,
    Unauthorized,

    // Dispatch and references (1100-1199)
    NoHandlerRegistered,
    ElementNotFound,

    // Trace (1200-1299)
    CycleDetected,
    TraceTimeout,
    TraceDepthExceeded,

    // Storage (2000-2099)
    StorageUnavailable,
    InvalidEventSequence,

    // Serialization (2200-2299)
    SerializationError,
    DeserializationError,

    // Configuration (5000-5099)
    ConfigurationError,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ConcurrencyConflict => 1000,
            Self::ValidationFailed => 1001,
            Self::DuplicateElement => 1002,
            Self::Unauthorized => 1003,

            Self::NoHandlerRegistered => 1100,
            Self::ElementNotFound => 1101,

            Self::CycleDetected => 1200,
            Self::TraceTimeout => 1201,
            Self::TraceDepthExceeded => 1202,

            Self::StorageUnavailable => 2000,
            Self::InvalidEventSequence => 2001,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only the command handlers' bounded conflict retry acts on this; nothing else
    /// retries automatically.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict | Self::StorageUnavailable)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "write",
            1100..=1199 => "reference",
            1200..=1299 => "trace",
            2000..=2099 => "storage",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, unknown ids)
    Low,
    /// Expected operational outcomes (conflicts, trace limits)
    Medium,
    /// System errors (storage, corrupted history)
    High,
    /// Bugs and broken configuration
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationFailed
            | ErrorCode::DuplicateElement
            | ErrorCode::ElementNotFound
            | ErrorCode::Unauthorized => Self::Low,

            ErrorCode::ConcurrencyConflict
            | ErrorCode::CycleDetected
            | ErrorCode::TraceTimeout
            | ErrorCode::TraceDepthExceeded => Self::Medium,

            ErrorCode::StorageUnavailable
            | ErrorCode::InvalidEventSequence
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError => Self::High,

            ErrorCode::NoHandlerRegistered
            | ErrorCode::ConfigurationError
            | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (element, stream, handler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type for NetGraph Core.
///
/// Every failure carries its kind (`code`) and a human-readable message.
#[derive(Error, Debug)]
pub struct NetError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-facing error message
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl NetError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a business-rule rejection.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "netgraph_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| NetError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| NetError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| NetError::new(ErrorCode::ElementNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| NetError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for NetError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process event payload", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for NetError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(
            ErrorCode::StorageUnavailable,
            "Event storage is unavailable",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<tokio::task::JoinError> for NetError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "Background task failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for NetError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            error.to_string(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl NetError {
    /// The stream advanced past the version the caller loaded.
    pub fn concurrency_conflict(stream_id: Uuid, expected: u64, actual: u64) -> Self {
        Self::new(
            ErrorCode::ConcurrencyConflict,
            format!(
                "Stream {} is at version {}, expected {}",
                stream_id, actual, expected
            ),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("stream", stream_id.to_string())
                .with_context("expected_version", expected)
                .with_context("actual_version", actual)
                .with_suggestion("Reload the aggregate and retry"),
        )
    }

    pub fn element_not_found(element_id: Uuid) -> Self {
        Self::new(
            ErrorCode::ElementNotFound,
            format!("Element not found: {}", element_id),
        )
        .with_details(ErrorDetails::new().with_entity("element", element_id.to_string()))
    }

    pub fn duplicate_element(element_id: Uuid) -> Self {
        Self::new(
            ErrorCode::DuplicateElement,
            format!("Element already exists: {}", element_id),
        )
        .with_details(ErrorDetails::new().with_entity("element", element_id.to_string()))
    }

    pub fn no_handler_registered(kind: &str, type_name: &str) -> Self {
        Self::new(
            ErrorCode::NoHandlerRegistered,
            format!("No {} handler registered for {}", kind, type_name),
        )
        .with_details(ErrorDetails::new().with_entity(kind, type_name))
    }

    pub fn cycle_detected(element_id: Uuid) -> Self {
        Self::new(
            ErrorCode::CycleDetected,
            format!("Cycle detected: element {} was reached twice", element_id),
        )
        .with_details(ErrorDetails::new().with_entity("element", element_id.to_string()))
    }

    pub fn trace_timeout(start_id: Uuid, visited: usize) -> Self {
        Self::new(
            ErrorCode::TraceTimeout,
            format!("Trace from {} exceeded its deadline", start_id),
        )
        .with_context("visited", visited)
    }

    pub fn trace_depth_exceeded(start_id: Uuid, max_steps: usize) -> Self {
        Self::new(
            ErrorCode::TraceDepthExceeded,
            format!("Trace from {} exceeded {} steps", start_id, max_steps),
        )
        .with_context("max_steps", max_steps)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::StorageUnavailable,
            "Event storage is unavailable",
            message,
        )
    }

    pub fn invalid_event_sequence(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidEventSequence, message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
