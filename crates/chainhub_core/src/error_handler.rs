use serde::{Deserialize, Serialize};

/// Classification of errors for logging and user display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Error caused by a user request (e.g., asking for an unknown network).
    UserError,
    /// The wallet declined or failed an operation.
    WalletError,
    /// RPC connectivity or timeout issue.
    NetworkError,
    /// Invalid or missing configuration. Startup-time defect.
    ConfigError,
    /// Anything else.
    SystemError,
}

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Non-critical, log only.
    Low,
    /// Show to user, recoverable.
    Medium,
    /// Operation failed.
    High,
    /// App cannot continue.
    Critical,
}

/// Classified error with context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub message: String,
    pub user_message: String,
    pub recoverable: bool,
}

/// Classify an `anyhow::Error` into severity, category, and a user-friendly
/// message by inspecting the error message for known patterns.
pub fn classify_error(error: &anyhow::Error) -> ClassifiedError {
    // `{:#}` includes the context chain, where the root cause usually lives.
    let msg = format!("{error:#}").to_lowercase();

    let (category, severity, user_msg) = if msg.contains("config")
        || msg.contains("no endpoints")
        || msg.contains("invalid endpoint")
        || msg.contains("duplicate network")
    {
        (
            ErrorCategory::ConfigError,
            ErrorSeverity::Critical,
            "Configuration error. Check your settings.",
        )
    } else if msg.contains("rejected") || msg.contains("wallet") {
        (
            ErrorCategory::WalletError,
            ErrorSeverity::Medium,
            "The wallet declined the request.",
        )
    } else if msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("endpoint")
        || msg.contains("dns")
    {
        (
            ErrorCategory::NetworkError,
            ErrorSeverity::Medium,
            "Network error. Check your connection.",
        )
    } else if msg.contains("unknown network")
        || msg.contains("unsupported network")
        || msg.contains("invalid account")
    {
        (
            ErrorCategory::UserError,
            ErrorSeverity::Low,
            "That network or account is not supported.",
        )
    } else {
        (
            ErrorCategory::SystemError,
            ErrorSeverity::High,
            "An unexpected error occurred.",
        )
    };

    ClassifiedError {
        severity,
        category,
        message: error.to_string(),
        user_message: user_msg.to_string(),
        recoverable: severity != ErrorSeverity::Critical,
    }
}
