//! In-process wallet backend for trying the session flows without a device.

use std::sync::{Mutex, MutexGuard, PoisonError};

use agrokit_core::{AccountId, BackendError, PasskeyMode, WalletBackend};

/// Code every emailed challenge expects.
pub const DEV_CODE: &str = "424242";

#[derive(Debug, Default)]
struct DevState {
    challenged: Option<String>,
    passkey_stored: bool,
    account: Option<AccountId>,
    email: Option<String>,
}

/// Accepts [`DEV_CODE`] for the last challenged address and any passkey
/// ceremony. "Sending" a challenge prints the code to stderr.
#[derive(Debug, Default)]
pub struct DevBackend {
    state: Mutex<DevState>,
}

impl DevBackend {
    /// A backend that already holds an active account, as after an app restart.
    pub fn signed_in(account: &str) -> Self {
        Self {
            state: Mutex::new(DevState {
                account: Some(account.to_string()),
                ..DevState::default()
            }),
        }
    }

    /// A backend whose device already stores a passkey.
    pub fn with_stored_passkey() -> Self {
        Self {
            state: Mutex::new(DevState {
                passkey_stored: true,
                ..DevState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DevState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl WalletBackend for DevBackend {
    async fn send_email_challenge(&self, email: String) -> Result<(), BackendError> {
        eprintln!("[dev backend] verification code for {email}: {DEV_CODE}");
        self.state().challenged = Some(email);
        Ok(())
    }

    async fn complete_email_login(
        &self,
        email: String,
        code: String,
    ) -> Result<AccountId, BackendError> {
        let mut state = self.state();
        if state.challenged.as_deref() != Some(email.as_str()) {
            return Err(BackendError::Rejected {
                reason: format!("no challenge outstanding for {email}"),
            });
        }
        if code != DEV_CODE {
            return Err(BackendError::Rejected {
                reason: "invalid code".to_string(),
            });
        }
        let account = format!("dev:{email}");
        state.challenged = None;
        state.account = Some(account.clone());
        state.email = Some(email);
        Ok(account)
    }

    async fn has_stored_passkey(&self) -> Result<bool, BackendError> {
        Ok(self.state().passkey_stored)
    }

    async fn passkey_login(&self, mode: PasskeyMode) -> Result<AccountId, BackendError> {
        tracing::info!(%mode, "running passkey ceremony");
        let mut state = self.state();
        state.passkey_stored = true;
        let account = "dev:passkey".to_string();
        state.account = Some(account.clone());
        Ok(account)
    }

    async fn verified_email(&self) -> Result<Option<String>, BackendError> {
        Ok(self.state().email.clone())
    }

    async fn active_account(&self) -> Result<Option<AccountId>, BackendError> {
        Ok(self.state().account.clone())
    }

    async fn disconnect(&self, account_id: AccountId) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.account.as_deref() != Some(account_id.as_str()) {
            return Err(BackendError::Rejected {
                reason: format!("{account_id} is not connected"),
            });
        }
        state.account = None;
        state.email = None;
        Ok(())
    }
}
