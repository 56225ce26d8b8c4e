//! Capabilities the session controller consumes from the wallet backend.
//!
//! Custody, signing and transport belong to the host app's wallet SDK. The
//! host implements these traits (in Swift, Kotlin or TypeScript through the
//! generated bindings, or in Rust) and hands them to the
//! [`SessionController`](crate::SessionController).

use strum::{Display, EnumString};

use crate::chain::Chain;
use crate::error::BackendError;
use crate::snapshot::{Balance, SessionSnapshot};

/// Opaque identifier of a connected account, as issued by the backend.
pub type AccountId = String;

/// Which passkey ceremony to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, uniffi::Enum)]
#[strum(serialize_all = "kebab-case")]
pub enum PasskeyMode {
    /// A passkey for this app is already stored on the device.
    SignIn,
    /// No passkey yet; create one.
    SignUp,
}

impl PasskeyMode {
    /// Picks the ceremony from whether a credential is already stored.
    #[must_use]
    pub const fn for_stored_passkey(has_stored_passkey: bool) -> Self {
        if has_stored_passkey {
            Self::SignIn
        } else {
            Self::SignUp
        }
    }
}

/// Authentication capabilities of the wallet backend.
///
/// Every method may take arbitrarily long; timeouts are the backend's
/// responsibility. A returned error is treated the same whether it was caused
/// by a timeout, a network failure or an explicit denial.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait WalletBackend: Send + Sync {
    /// Emails a one-time verification code to `email`.
    ///
    /// # Errors
    /// Returns an error if the challenge could not be dispatched.
    async fn send_email_challenge(&self, email: String) -> Result<(), BackendError>;

    /// Completes an email login with the code the user received.
    ///
    /// # Errors
    /// Returns an error if the code is wrong or expired, or the call fails.
    async fn complete_email_login(
        &self,
        email: String,
        code: String,
    ) -> Result<AccountId, BackendError>;

    /// Whether a passkey credential for this app is already stored on the device.
    ///
    /// # Errors
    /// Returns an error if the platform credential store cannot be queried.
    async fn has_stored_passkey(&self) -> Result<bool, BackendError>;

    /// Runs the passkey ceremony.
    ///
    /// # Errors
    /// Returns an error if the user cancels or the ceremony is rejected.
    async fn passkey_login(&self, mode: PasskeyMode) -> Result<AccountId, BackendError>;

    /// Verified email of the active account, if the backend knows one.
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    async fn verified_email(&self) -> Result<Option<String>, BackendError>;

    /// The account the backend reconnected on its own, e.g. after an app restart.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be queried.
    async fn active_account(&self) -> Result<Option<AccountId>, BackendError>;

    /// Disconnects the given account.
    ///
    /// # Errors
    /// Returns an error if the backend could not disconnect. The controller
    /// clears the local session regardless.
    async fn disconnect(&self, account_id: AccountId) -> Result<(), BackendError>;
}

/// Balance capability of the wallet backend.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Native balance of `address` on `chain`.
    ///
    /// # Errors
    /// Returns an error if the balance cannot be fetched.
    async fn query_balance(
        &self,
        chain: Chain,
        address: String,
    ) -> Result<Balance, BackendError>;
}

/// Receives every snapshot the controller publishes, in revision order.
///
/// Called with no controller lock held, on the thread whose operation
/// published the snapshot (or one that was already delivering). The callback
/// may read [`SessionController::snapshot`](crate::SessionController::snapshot)
/// and call controller operations; snapshots those calls publish arrive after
/// the callback returns.
#[uniffi::export(with_foreign)]
pub trait SessionObserver: Send + Sync {
    /// A new snapshot was published.
    fn on_snapshot(&self, snapshot: SessionSnapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_passkey_mode_follows_stored_credential() {
        assert_eq!(PasskeyMode::for_stored_passkey(true), PasskeyMode::SignIn);
        assert_eq!(PasskeyMode::for_stored_passkey(false), PasskeyMode::SignUp);
    }

    #[test]
    fn test_passkey_mode_wire_names() {
        assert_eq!(PasskeyMode::SignIn.to_string(), "sign-in");
        assert_eq!(PasskeyMode::from_str("sign-up").unwrap(), PasskeyMode::SignUp);
    }
}
