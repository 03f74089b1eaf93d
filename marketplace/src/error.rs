//! Error types for the marketplace
//!
//! Every variant maps to an [`ErrorKind`] that callers report verbatim.
//! Internal failures keep their cause for logs but show callers only a
//! generic message.

use serde::Serialize;
use thiserror::Error;

/// Result type for marketplace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message for guests blocked by policy
pub const GUEST_NOT_ALLOWED: &str = "Guest accounts cannot perform this action";

/// Message shown for any internal failure
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Marketplace errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller may not perform the action
    #[error("{0}")]
    Unauthorized(String),

    /// Checkout with no cart entries
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart exceeds the configured maximum
    #[error("Cart cannot contain more than {max} items")]
    CartTooLarge {
        /// Configured maximum
        max: usize,
    },

    /// Buyer balance below cart total
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Duplicate or stale state
    #[error("{0}")]
    Conflict(String),

    /// Caller already owns the item
    #[error("You cannot purchase your own item")]
    SelfPurchase,

    /// Missing, or not owned by the caller
    #[error("{0}")]
    NotFound(String),

    /// Input outside accepted bounds
    #[error("{0}")]
    BadRequest(String),

    /// Store failure
    #[error("Store error: {0}")]
    Store(#[from] ledger_store::Error),

    /// Stored state contradicts a marketplace invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Guest on a restricted action, or unknown caller
    Unauthorized,
    /// Checkout with no cart entries
    EmptyCart,
    /// Cart exceeds the configured maximum
    CartTooLarge,
    /// Balance below cart total
    InsufficientFunds,
    /// Duplicate or stale state
    Conflict,
    /// Caller already owns the item
    SelfPurchase,
    /// Missing, or not owned by the caller
    NotFound,
    /// Input outside accepted bounds
    BadRequest,
    /// Unexpected failure
    Internal,
}

impl ErrorKind {
    /// Stable code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::EmptyCart => "EMPTY_CART",
            ErrorKind::CartTooLarge => "CART_TOO_LARGE",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::SelfPurchase => "SELF_PURCHASE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Guest blocked by the guest policy
    pub fn guest_not_allowed() -> Self {
        Error::Unauthorized(GUEST_NOT_ALLOWED.to_string())
    }

    /// Caller identity not known to the store
    pub fn unknown_user() -> Self {
        Error::Unauthorized("Unknown user".to_string())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::EmptyCart => ErrorKind::EmptyCart,
            Error::CartTooLarge { .. } => ErrorKind::CartTooLarge,
            Error::InsufficientFunds => ErrorKind::InsufficientFunds,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::SelfPurchase => ErrorKind::SelfPurchase,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::Store(_)
            | Error::InvariantViolation(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the cause must stay server-side
    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }

    /// Message safe to show the caller
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}
