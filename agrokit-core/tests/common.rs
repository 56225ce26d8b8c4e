//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use agrokit_core::{
    AccountId, Balance, BalanceProvider, BackendError, Chain, PasskeyMode, SessionConfig,
    SessionController, SessionObserver, SessionSnapshot, WalletBackend,
};
use tokio::sync::Notify;

pub const ACCOUNT: &str = "acct-1";
pub const EMAIL: &str = "user@example.com";
pub const VALID_CODE: &str = "123456";
pub const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const OTHER_ADDRESS: &str = "0x0000000000000000000000000000000000000001";

/// Lets a test park a backend call until it calls [`Gate::release`].
#[derive(Default)]
pub struct Gate {
    held: Mutex<HashSet<&'static str>>,
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// The next call to `method` blocks once it has been entered.
    pub fn hold(&self, method: &'static str) {
        self.held.lock().unwrap().insert(method);
    }

    /// Resolves once a held call is waiting.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self, method: &'static str) {
        let held = self.held.lock().unwrap().remove(method);
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

/// Knobs for [`ScriptedBackend`].
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub fail_challenge: bool,
    pub fail_passkey: bool,
    pub fail_disconnect: bool,
    pub fail_active_account: bool,
    pub passkey_stored: bool,
    pub verified_email: Option<String>,
    pub active_account: Option<AccountId>,
}

/// In-memory [`WalletBackend`] that records every call.
///
/// Accepts [`VALID_CODE`] for any address that was sent a challenge.
#[derive(Default)]
pub struct ScriptedBackend {
    pub gate: Gate,
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Script) -> Arc<Self> {
        let backend = Self::default();
        *backend.script.lock().unwrap() = script;
        Arc::new(backend)
    }

    pub fn script(&self, edit: impl FnOnce(&mut Script)) {
        edit(&mut self.script.lock().unwrap());
    }

    /// Number of calls whose recorded name starts with `method`.
    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(method))
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn current(&self) -> Script {
        self.script.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn rejected(reason: &str) -> BackendError {
    BackendError::Rejected {
        reason: reason.to_string(),
    }
}

#[async_trait::async_trait]
impl WalletBackend for ScriptedBackend {
    async fn send_email_challenge(&self, email: String) -> Result<(), BackendError> {
        self.record(format!("send_email_challenge:{email}"));
        self.gate.pass("send_email_challenge").await;
        if self.current().fail_challenge {
            return Err(rejected("smtp unavailable"));
        }
        Ok(())
    }

    async fn complete_email_login(
        &self,
        email: String,
        code: String,
    ) -> Result<AccountId, BackendError> {
        self.record(format!("complete_email_login:{email}"));
        self.gate.pass("complete_email_login").await;
        if code == VALID_CODE {
            Ok(ACCOUNT.to_string())
        } else {
            Err(rejected("invalid code"))
        }
    }

    async fn has_stored_passkey(&self) -> Result<bool, BackendError> {
        self.record("has_stored_passkey".to_string());
        Ok(self.current().passkey_stored)
    }

    async fn passkey_login(&self, mode: PasskeyMode) -> Result<AccountId, BackendError> {
        self.record(format!("passkey_login:{mode}"));
        self.gate.pass("passkey_login").await;
        if self.current().fail_passkey {
            return Err(rejected("user cancelled"));
        }
        Ok(ACCOUNT.to_string())
    }

    async fn verified_email(&self) -> Result<Option<String>, BackendError> {
        self.record("verified_email".to_string());
        self.gate.pass("verified_email").await;
        Ok(self.current().verified_email)
    }

    async fn active_account(&self) -> Result<Option<AccountId>, BackendError> {
        self.record("active_account".to_string());
        let script = self.current();
        if script.fail_active_account {
            return Err(BackendError::Network {
                url: "https://wallet.invalid".to_string(),
                status: None,
                error: "offline".to_string(),
            });
        }
        Ok(script.active_account)
    }

    async fn disconnect(&self, account_id: AccountId) -> Result<(), BackendError> {
        self.record(format!("disconnect:{account_id}"));
        self.gate.pass("disconnect").await;
        if self.current().fail_disconnect {
            return Err(rejected("session not found"));
        }
        Ok(())
    }
}

pub fn agro(amount: &str) -> Balance {
    Balance {
        amount: amount.to_string(),
        symbol: "AGRO".to_string(),
    }
}

/// [`BalanceProvider`] answering from a queue of scripted results.
///
/// Returns `1.5 AGRO` once the queue is empty.
#[derive(Default)]
pub struct StubBalances {
    pub gate: Gate,
    results: Mutex<VecDeque<Result<Balance, BackendError>>>,
    queries: Mutex<Vec<String>>,
}

impl StubBalances {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: Result<Balance, BackendError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BalanceProvider for StubBalances {
    async fn query_balance(
        &self,
        chain: Chain,
        address: String,
    ) -> Result<Balance, BackendError> {
        assert_eq!(chain, Chain::default());
        self.queries.lock().unwrap().push(address);
        self.gate.pass("query_balance").await;
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(agro("1.5")))
    }
}

/// Keeps every snapshot it is handed.
#[derive(Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<SessionSnapshot>>,
}

impl RecordingObserver {
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_snapshot(&self, snapshot: SessionSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }
}

pub fn controller(
    backend: &Arc<ScriptedBackend>,
    balances: &Arc<StubBalances>,
) -> SessionController {
    SessionController::new(backend.clone(), balances.clone(), SessionConfig::default())
}

/// Runs the full email login for [`EMAIL`].
pub async fn sign_in(controller: &SessionController) {
    controller.request_email_code(EMAIL.to_string()).await.unwrap();
    controller
        .confirm_email_code(EMAIL.to_string(), VALID_CODE.to_string())
        .await
        .unwrap();
}
