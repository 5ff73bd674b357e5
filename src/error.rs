//! Shared error-code contract for errors surfaced to the presentation layer.

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for surfaced errors.
///
/// The core never retries on its own; `retryable` only tells the caller
/// whether repeating the same request could plausibly succeed.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
