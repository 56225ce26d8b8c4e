use serde::Serialize;
use strum::Display;
use thiserror::Error;

use crate::snapshot::SessionStatus;

/// Error outputs from the session controller.
///
/// Most variants are also recorded in the snapshot's `last_error` (see
/// [`SessionError::is_recorded`]) so screens can react without wrapping each
/// call in their own failure handling.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum SessionError {
    /// The presented input is not valid for the requested operation
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending argument.
        attribute: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Another operation of the same category is still waiting on the backend
    #[error("operation_in_progress")]
    OperationInProgress,
    /// The operation is not allowed from the current session status
    #[error("invalid_transition: cannot {operation} while {status}")]
    InvalidTransition {
        /// The rejected operation.
        operation: String,
        /// Status the session was in.
        status: SessionStatus,
    },
    /// The backend could not send the email verification challenge
    #[error("challenge_dispatch_failed: {reason}")]
    ChallengeDispatchFailed {
        /// Backend failure description.
        reason: String,
    },
    /// The backend rejected the one-time code
    #[error("verification_failed: {reason}")]
    VerificationFailed {
        /// Backend failure description.
        reason: String,
    },
    /// Passkey sign-in or sign-up was rejected
    #[error("passkey_failed: {reason}")]
    PasskeyFailed {
        /// Backend failure description.
        reason: String,
    },
    /// The backend disconnect call failed. The local session is cleared anyway.
    #[error("logout_backend_failed: {reason}")]
    LogoutBackendFailed {
        /// Backend failure description.
        reason: String,
    },
    /// The balance query failed. The last known balance is kept.
    #[error("balance_unavailable: {reason}")]
    BalanceUnavailable {
        /// Backend failure description.
        reason: String,
    },
}

impl SessionError {
    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_transition(operation: &str, status: SessionStatus) -> Self {
        Self::InvalidTransition {
            operation: operation.to_string(),
            status,
        }
    }

    /// Returns the tag used for this error in the session snapshot.
    #[must_use]
    pub const fn kind(&self) -> SessionErrorKind {
        match self {
            Self::InvalidInput { .. } => SessionErrorKind::InvalidInput,
            Self::OperationInProgress => SessionErrorKind::OperationInProgress,
            Self::InvalidTransition { .. } => SessionErrorKind::InvalidTransition,
            Self::ChallengeDispatchFailed { .. } => {
                SessionErrorKind::ChallengeDispatchFailed
            }
            Self::VerificationFailed { .. } => SessionErrorKind::VerificationFailed,
            Self::PasskeyFailed { .. } => SessionErrorKind::PasskeyFailed,
            Self::LogoutBackendFailed { .. } => SessionErrorKind::LogoutBackendFailed,
            Self::BalanceUnavailable { .. } => SessionErrorKind::BalanceUnavailable,
        }
    }

    /// Whether the error is written to `last_error`.
    ///
    /// `OperationInProgress` is only returned: the operation already in flight
    /// owns `last_error` until it settles.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        !matches!(self, Self::OperationInProgress)
    }
}

/// Tag of a [`SessionError`], as exposed through the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// See [`SessionError::InvalidInput`].
    InvalidInput,
    /// See [`SessionError::OperationInProgress`].
    OperationInProgress,
    /// See [`SessionError::InvalidTransition`].
    InvalidTransition,
    /// See [`SessionError::ChallengeDispatchFailed`].
    ChallengeDispatchFailed,
    /// See [`SessionError::VerificationFailed`].
    VerificationFailed,
    /// See [`SessionError::PasskeyFailed`].
    PasskeyFailed,
    /// See [`SessionError::LogoutBackendFailed`].
    LogoutBackendFailed,
    /// See [`SessionError::BalanceUnavailable`].
    BalanceUnavailable,
}

/// The last operation failure, as stored in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct SessionFailure {
    /// What kind of failure this was.
    pub kind: SessionErrorKind,
    /// Human readable description, suitable for logs.
    pub message: String,
}

impl From<&SessionError> for SessionFailure {
    fn from(error: &SessionError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Errors returned by wallet backend implementations.
///
/// Backends are usually implemented by the host app on top of its wallet SDK.
/// The controller never surfaces these directly: each one is translated into
/// the [`SessionError`] matching the operation that issued the call.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum BackendError {
    /// The backend explicitly refused the request (wrong code, denied passkey, ...).
    #[error("rejected: {reason}")]
    Rejected {
        /// Backend supplied reason.
        reason: String,
    },
    /// Network connection error with details
    #[error("network_error: {url} (status {status:?}): {error}")]
    Network {
        /// Endpoint that failed.
        url: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Failure description.
        error: String,
    },
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {reason}")]
    Unexpected {
        /// Failure description.
        reason: String,
    },
}

impl BackendError {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for BackendError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Unexpected {
            reason: error.reason,
        }
    }
}
