//! The session snapshot and the transitions of the authentication state machine.
//!
//! A [`SessionSnapshot`] is a plain value. The controller owns the only mutable
//! copy; every transition below either applies completely or returns an error
//! without touching the snapshot, and the controller publishes the result as a
//! new snapshot.

use serde::Serialize;
use strum::Display;

use crate::backend::AccountId;
use crate::error::{SessionError, SessionFailure};

/// Authentication status. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, uniffi::Enum)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No account is connected.
    Unauthenticated,
    /// A verification code was (or is being) emailed; waiting for the code.
    VerificationPending,
    /// A login call (code confirmation, passkey or restore) is outstanding.
    Authenticating,
    /// An account is connected.
    Authenticated,
    /// The backend disconnect call is outstanding.
    LoggingOut,
}

/// Native balance of an address, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct Balance {
    /// Decimal string, e.g. `"12.5"`.
    pub amount: String,
    /// Currency symbol, e.g. `"AGRO"`.
    pub symbol: String,
}

/// The state all screens render from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct SessionSnapshot {
    /// Current authentication status.
    pub status: SessionStatus,
    /// Active account. Present if and only if `status` is `Authenticated`.
    pub account_id: Option<AccountId>,
    /// Verified email of the active account, looked up on a best-effort basis.
    pub email: Option<String>,
    /// Last successfully fetched balance.
    pub balance: Option<Balance>,
    /// Address the current verification code was sent to.
    pub pending_email: Option<String>,
    /// An authentication or logout backend call is outstanding.
    pub in_flight: bool,
    /// A balance query is outstanding.
    pub refreshing_balance: bool,
    /// Last operation failure.
    pub last_error: Option<SessionFailure>,
    /// Incremented by one on every published replacement.
    pub revision: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            account_id: None,
            email: None,
            balance: None,
            pending_email: None,
            in_flight: false,
            refreshing_balance: false,
            last_error: None,
            revision: 0,
        }
    }
}

impl SessionSnapshot {
    /// Checks the structural invariants of the snapshot.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let account_matches_status =
            self.account_id.is_some() == (self.status == SessionStatus::Authenticated);
        let pending_in_email_flow = self.pending_email.is_none()
            || matches!(
                self.status,
                SessionStatus::VerificationPending | SessionStatus::Authenticating
            );
        account_matches_status && pending_in_email_flow
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.in_flight {
            return Err(SessionError::OperationInProgress);
        }
        Ok(())
    }

    fn ensure_status(
        &self,
        operation: &str,
        allowed: &[SessionStatus],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(SessionError::invalid_transition(operation, self.status))
        }
    }

    fn start(&mut self, status: SessionStatus) {
        self.status = status;
        self.in_flight = true;
        self.last_error = None;
    }

    fn settle(&mut self, status: SessionStatus) {
        self.status = status;
        self.in_flight = false;
    }

    pub(crate) fn record(&mut self, error: &SessionError) {
        if error.is_recorded() {
            self.last_error = Some(error.into());
        }
    }

    // Email flow

    /// `email` is the result of local validation, checked after the in-flight
    /// and status guards.
    pub(crate) fn begin_email_request(
        &mut self,
        email: Result<String, SessionError>,
    ) -> Result<String, SessionError> {
        self.ensure_idle()?;
        self.ensure_status("request_email_code", &[SessionStatus::Unauthenticated])?;
        let email = email?;
        self.start(SessionStatus::VerificationPending);
        Ok(email)
    }

    pub(crate) fn finish_email_request(
        &mut self,
        email: String,
        outcome: Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        match outcome {
            Ok(()) => {
                self.settle(SessionStatus::VerificationPending);
                self.pending_email = Some(email);
                Ok(())
            }
            Err(error) => {
                self.abort_email_request();
                self.record(&error);
                Err(error)
            }
        }
    }

    pub(crate) fn abort_email_request(&mut self) {
        self.settle(SessionStatus::Unauthenticated);
        self.pending_email = None;
    }

    /// `credentials` is the validated `(email, code)` pair.
    pub(crate) fn begin_confirmation(
        &mut self,
        credentials: Result<(String, String), SessionError>,
    ) -> Result<(String, String), SessionError> {
        self.ensure_idle()?;
        self.ensure_status("confirm_email_code", &[SessionStatus::VerificationPending])?;
        let (email, code) = credentials?;
        if self.pending_email.as_deref() != Some(email.as_str()) {
            return Err(SessionError::invalid_input(
                "email",
                "does not match the address the code was sent to",
            ));
        }
        self.start(SessionStatus::Authenticating);
        Ok((email, code))
    }

    pub(crate) fn fail_confirmation(&mut self, error: &SessionError) {
        self.abort_confirmation();
        self.record(error);
    }

    pub(crate) fn abort_confirmation(&mut self) {
        self.settle(SessionStatus::VerificationPending);
    }

    pub(crate) fn cancel_email_login(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.ensure_status("cancel_email_login", &[SessionStatus::VerificationPending])?;
        self.settle(SessionStatus::Unauthenticated);
        self.pending_email = None;
        self.last_error = None;
        Ok(())
    }

    // Passkey and restore

    pub(crate) fn begin_passkey(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.ensure_status(
            "login_with_passkey",
            &[
                SessionStatus::Unauthenticated,
                SessionStatus::VerificationPending,
            ],
        )?;
        // Switching to a passkey abandons any pending email login.
        self.pending_email = None;
        self.start(SessionStatus::Authenticating);
        Ok(())
    }

    pub(crate) fn begin_restore(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.ensure_status("restore_session", &[SessionStatus::Unauthenticated])?;
        self.start(SessionStatus::Authenticating);
        Ok(())
    }

    /// Passkey, restore, and anything else that falls back to `Unauthenticated`.
    pub(crate) fn abort_login(&mut self) {
        self.settle(SessionStatus::Unauthenticated);
        self.pending_email = None;
    }

    pub(crate) fn fail_login(&mut self, error: &SessionError) {
        self.abort_login();
        self.record(error);
    }

    pub(crate) fn authenticate(&mut self, account_id: AccountId) {
        self.settle(SessionStatus::Authenticated);
        self.account_id = Some(account_id);
        self.pending_email = None;
    }

    pub(crate) fn attach_email(&mut self, email: String) {
        if self.status == SessionStatus::Authenticated {
            self.email = Some(email);
        }
    }

    // Logout

    /// Moves to `LoggingOut` and hands back the account to disconnect.
    pub(crate) fn begin_logout(&mut self) -> Result<AccountId, SessionError> {
        self.ensure_idle()?;
        self.ensure_status("logout", &[SessionStatus::Authenticated])?;
        let account_id = self
            .account_id
            .take()
            .ok_or_else(|| SessionError::invalid_transition("logout", self.status))?;
        self.start(SessionStatus::LoggingOut);
        Ok(account_id)
    }

    pub(crate) fn finish_logout(&mut self, error: Option<&SessionError>) {
        self.settle(SessionStatus::Unauthenticated);
        self.account_id = None;
        self.email = None;
        self.balance = None;
        self.pending_email = None;
        if let Some(error) = error {
            self.record(error);
        }
    }

    pub(crate) fn abort_logout(&mut self) {
        self.finish_logout(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionErrorKind;

    const EMAIL: &str = "user@example.com";

    fn credentials(email: &str) -> Result<(String, String), SessionError> {
        Ok((email.to_string(), "123456".to_string()))
    }

    fn authenticated() -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_restore().unwrap();
        snapshot.authenticate("acct-1".to_string());
        snapshot
    }

    #[test]
    fn test_initial_snapshot_is_unauthenticated_and_empty() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
        assert!(snapshot.account_id.is_none());
        assert!(snapshot.balance.is_none());
        assert!(!snapshot.in_flight);
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_email_request_sets_pending_email_only_on_success() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_email_request(Ok(EMAIL.to_string())).unwrap();
        assert_eq!(snapshot.status, SessionStatus::VerificationPending);
        assert!(snapshot.in_flight);
        assert!(snapshot.pending_email.is_none());

        snapshot
            .finish_email_request(EMAIL.to_string(), Ok(()))
            .unwrap();
        assert!(!snapshot.in_flight);
        assert_eq!(snapshot.pending_email.as_deref(), Some("user@example.com"));
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_failed_email_request_returns_to_unauthenticated() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_email_request(Ok(EMAIL.to_string())).unwrap();
        let error = SessionError::ChallengeDispatchFailed {
            reason: "smtp down".to_string(),
        };
        let result = snapshot.finish_email_request(EMAIL.to_string(), Err(error));
        assert!(result.is_err());
        assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
        assert!(snapshot.pending_email.is_none());
        assert_eq!(
            snapshot.last_error.map(|e| e.kind),
            Some(SessionErrorKind::ChallengeDispatchFailed)
        );
    }

    #[test]
    fn test_in_flight_rejects_before_status_guard() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_email_request(Ok(EMAIL.to_string())).unwrap();
        let before = snapshot.clone();
        assert_eq!(
            snapshot.begin_passkey(),
            Err(SessionError::OperationInProgress)
        );
        assert_eq!(
            snapshot.begin_logout(),
            Err(SessionError::OperationInProgress)
        );
        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_confirmation_requires_matching_pending_email() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_email_request(Ok(EMAIL.to_string())).unwrap();
        snapshot
            .finish_email_request(EMAIL.to_string(), Ok(()))
            .unwrap();

        let error = snapshot
            .begin_confirmation(credentials("other@example.com"))
            .unwrap_err();
        assert_eq!(error.kind(), SessionErrorKind::InvalidInput);
        assert_eq!(snapshot.status, SessionStatus::VerificationPending);

        snapshot.begin_confirmation(credentials(EMAIL)).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Authenticating);
        assert_eq!(snapshot.pending_email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn test_failed_confirmation_keeps_pending_email() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_email_request(Ok(EMAIL.to_string())).unwrap();
        snapshot
            .finish_email_request(EMAIL.to_string(), Ok(()))
            .unwrap();
        snapshot.begin_confirmation(credentials(EMAIL)).unwrap();
        snapshot.fail_confirmation(&SessionError::VerificationFailed {
            reason: "wrong code".to_string(),
        });
        assert_eq!(snapshot.status, SessionStatus::VerificationPending);
        assert_eq!(snapshot.pending_email.as_deref(), Some("user@example.com"));
        assert!(!snapshot.in_flight);
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_passkey_abandons_pending_email() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.begin_email_request(Ok(EMAIL.to_string())).unwrap();
        snapshot
            .finish_email_request(EMAIL.to_string(), Ok(()))
            .unwrap();
        snapshot.begin_passkey().unwrap();
        assert!(snapshot.pending_email.is_none());
        assert_eq!(snapshot.status, SessionStatus::Authenticating);
    }

    #[test]
    fn test_logout_moves_account_out_of_snapshot() {
        let mut snapshot = authenticated();
        snapshot.email = Some("user@example.com".to_string());
        let account_id = snapshot.begin_logout().unwrap();
        assert_eq!(account_id, "acct-1");
        assert_eq!(snapshot.status, SessionStatus::LoggingOut);
        assert!(snapshot.is_consistent());

        snapshot.finish_logout(Some(&SessionError::LogoutBackendFailed {
            reason: "offline".to_string(),
        }));
        assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
        assert!(snapshot.email.is_none());
        assert_eq!(
            snapshot.last_error.map(|e| e.kind),
            Some(SessionErrorKind::LogoutBackendFailed)
        );
    }

    #[test]
    fn test_operations_rejected_from_wrong_status() {
        let mut snapshot = SessionSnapshot::default();
        assert_eq!(
            snapshot.begin_logout().unwrap_err().kind(),
            SessionErrorKind::InvalidTransition
        );
        assert_eq!(
            snapshot.cancel_email_login().unwrap_err().kind(),
            SessionErrorKind::InvalidTransition
        );

        let mut snapshot = authenticated();
        assert_eq!(
            snapshot
                .begin_email_request(Ok(EMAIL.to_string()))
                .unwrap_err()
                .kind(),
            SessionErrorKind::InvalidTransition
        );
        assert_eq!(
            snapshot.begin_passkey().unwrap_err().kind(),
            SessionErrorKind::InvalidTransition
        );
    }

    #[test]
    fn test_attach_email_ignored_outside_authenticated() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.attach_email("late@example.com".to_string());
        assert!(snapshot.email.is_none());
    }
}
