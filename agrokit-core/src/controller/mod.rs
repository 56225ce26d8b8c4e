//! The session controller: the single writer of the [`SessionSnapshot`].
//!
//! Every operation follows the same shape: an atomic guard check that either
//! rejects the call or moves the snapshot into its "waiting" state, exactly one
//! outstanding backend call, and a landing transition applied when that call
//! resolves. The guard and the landing each publish at most one snapshot.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::backend::{BalanceProvider, PasskeyMode, SessionObserver, WalletBackend};
use crate::chain::{Chain, SessionConfig};
use crate::email::{mask_email, normalize_code, normalize_email};
use crate::error::{BackendError, SessionError};
use crate::rpc::ChainRpcBalances;
use crate::snapshot::{SessionSnapshot, SessionStatus};

mod balance;
mod flight;

pub use balance::BalanceRefresh;
use balance::BalanceFlight;
use flight::Flight;

/// Mutable state behind the controller's lock.
struct SessionState {
    snapshot: SessionSnapshot,
    /// Advances every time the session leaves `Authenticated`. Results of calls
    /// issued under an older epoch are discarded.
    epoch: u64,
    balance_flight: Option<BalanceFlight>,
    next_flight_id: u64,
}

/// Snapshots waiting to be handed to observers, in revision order.
///
/// Delivery happens outside the state lock. Whichever caller finds the queue
/// idle drains it; callers arriving while it drains only enqueue.
#[derive(Default)]
struct Observers {
    registered: Vec<Registration>,
    queue: VecDeque<Delivery>,
    draining: bool,
}

struct Registration {
    observer: Arc<dyn SessionObserver>,
    /// Revision of the snapshot delivered on registration.
    since: u64,
}

enum Delivery {
    Initial(Arc<dyn SessionObserver>, SessionSnapshot),
    Broadcast(SessionSnapshot),
}

/// Clears the draining flag if an observer panics mid-delivery.
struct Drain<'a> {
    controller: &'a SessionController,
    finished: bool,
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.controller.lock_observers().draining = false;
        }
    }
}

/// Orchestrates sign-in, logout and balance refresh for one wallet session.
///
/// Create one instance at the application root and share it with every screen.
/// Screens call the operations below and render [`SessionController::snapshot`]
/// or subscribe to replacements; they never mutate session state themselves.
///
/// Authentication operations (`request_email_code`, `confirm_email_code`,
/// `login_with_passkey`, `logout`, `restore_session`) are serialized by the
/// snapshot's `in_flight` flag: while one is waiting on the backend, any other
/// fails fast with [`SessionError::OperationInProgress`] without reaching the
/// backend. Balance refreshes have their own flag and never block sign-in.
#[derive(uniffi::Object)]
pub struct SessionController {
    backend: Arc<dyn WalletBackend>,
    balances: Arc<dyn BalanceProvider>,
    chain: Chain,
    state: Mutex<SessionState>,
    updates: watch::Sender<SessionSnapshot>,
    observers: Mutex<Observers>,
}

#[uniffi::export(async_runtime = "tokio")]
impl SessionController {
    /// Creates a controller in the `Unauthenticated` state.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        backend: Arc<dyn WalletBackend>,
        balances: Arc<dyn BalanceProvider>,
        config: SessionConfig,
    ) -> Self {
        let snapshot = SessionSnapshot::default();
        let (updates, _) = watch::channel(snapshot.clone());
        Self {
            backend,
            balances,
            chain: config.chain,
            state: Mutex::new(SessionState {
                snapshot,
                epoch: 0,
                balance_flight: None,
                next_flight_id: 0,
            }),
            updates,
            observers: Mutex::new(Observers::default()),
        }
    }

    /// Creates a controller whose balances come from the configured chain's
    /// JSON-RPC endpoint.
    #[uniffi::constructor]
    #[must_use]
    pub fn with_chain_rpc(backend: Arc<dyn WalletBackend>, config: SessionConfig) -> Self {
        let balances = Arc::new(ChainRpcBalances::new(&config));
        Self::new(backend, balances, config)
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.updates.borrow().clone()
    }

    /// Registers an observer. It first receives the current snapshot and then
    /// every replacement, in order.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        {
            let state = self.lock_state();
            let mut observers = self.lock_observers();
            observers.registered.push(Registration {
                observer: observer.clone(),
                since: state.snapshot.revision,
            });
            observers
                .queue
                .push_back(Delivery::Initial(observer, state.snapshot.clone()));
        }
        self.deliver();
    }

    /// Emails a verification code to `email`.
    ///
    /// `Unauthenticated` → `VerificationPending`. On success `pending_email`
    /// holds the lower-cased address.
    ///
    /// # Errors
    /// - [`SessionError::OperationInProgress`] if another operation is in flight.
    /// - [`SessionError::InvalidTransition`] unless `Unauthenticated`.
    /// - [`SessionError::InvalidInput`] if `email` is malformed. Nothing is sent.
    /// - [`SessionError::ChallengeDispatchFailed`] if the backend call fails;
    ///   the session returns to `Unauthenticated`.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn request_email_code(&self, email: String) -> Result<(), SessionError> {
        let email = normalize_email(&email);
        let email = self.begin(|snapshot| snapshot.begin_email_request(email))?;

        log::info!("sending verification code to {}", mask_email(&email));
        let flight = Flight::new(
            self,
            "request_email_code",
            SessionSnapshot::abort_email_request,
        );
        let outcome = self
            .backend
            .send_email_challenge(email.clone())
            .await
            .map_err(|e| {
                log::error!("sending verification code failed: {e}");
                SessionError::ChallengeDispatchFailed {
                    reason: e.to_string(),
                }
            });
        flight.land(|state| state.snapshot.finish_email_request(email, outcome))
    }

    /// Completes an email login with the code the user received.
    ///
    /// `VerificationPending` → `Authenticating` → `Authenticated`. The verified
    /// email is then looked up on a best-effort basis.
    ///
    /// # Errors
    /// - [`SessionError::OperationInProgress`] if another operation is in flight.
    /// - [`SessionError::InvalidTransition`] unless `VerificationPending`.
    /// - [`SessionError::InvalidInput`] if the code is empty or `email` is not the
    ///   address the code was sent to.
    /// - [`SessionError::VerificationFailed`] if the backend rejects the code; the
    ///   session returns to `VerificationPending` so the user can retry.
    #[allow(clippy::needless_pass_by_value)]
    pub async fn confirm_email_code(
        &self,
        email: String,
        code: String,
    ) -> Result<(), SessionError> {
        let credentials = normalize_email(&email)
            .and_then(|email| normalize_code(&code).map(|code| (email, code)));
        let (email, code) = self.begin(|snapshot| snapshot.begin_confirmation(credentials))?;

        log::info!("confirming verification code for {}", mask_email(&email));
        let flight = Flight::new(
            self,
            "confirm_email_code",
            SessionSnapshot::abort_confirmation,
        );
        match self.backend.complete_email_login(email, code).await {
            Ok(account_id) => {
                let epoch = Self::land_authenticated(flight, account_id);
                log::info!("email login succeeded");
                self.fetch_verified_email(epoch).await;
                Ok(())
            }
            Err(e) => {
                log::warn!("verification code rejected: {e}");
                let error = SessionError::VerificationFailed {
                    reason: e.to_string(),
                };
                flight.land(|state| state.snapshot.fail_confirmation(&error));
                Err(error)
            }
        }
    }

    /// Abandons a pending email login. `VerificationPending` → `Unauthenticated`.
    ///
    /// # Errors
    /// - [`SessionError::OperationInProgress`] if another operation is in flight.
    /// - [`SessionError::InvalidTransition`] unless `VerificationPending`.
    pub fn cancel_email_login(&self) -> Result<(), SessionError> {
        self.begin(SessionSnapshot::cancel_email_login)?;
        log::info!("email login abandoned");
        Ok(())
    }

    /// Signs in with a passkey, or signs up if none is stored on the device.
    ///
    /// The ceremony is chosen once, when the call starts.
    ///
    /// # Errors
    /// - [`SessionError::OperationInProgress`] if another operation is in flight.
    /// - [`SessionError::InvalidTransition`] unless `Unauthenticated` or
    ///   `VerificationPending`.
    /// - [`SessionError::PasskeyFailed`] if the ceremony fails; the session returns
    ///   to `Unauthenticated`.
    pub async fn login_with_passkey(&self) -> Result<(), SessionError> {
        self.begin(SessionSnapshot::begin_passkey)?;
        let flight = Flight::new(self, "login_with_passkey", SessionSnapshot::abort_login);

        let mode = match self.backend.has_stored_passkey().await {
            Ok(stored) => PasskeyMode::for_stored_passkey(stored),
            Err(e) => return Err(Self::land_passkey_failure(flight, &e)),
        };
        log::info!("starting passkey {mode}");

        match self.backend.passkey_login(mode).await {
            Ok(account_id) => {
                let epoch = Self::land_authenticated(flight, account_id);
                log::info!("passkey {mode} succeeded");
                self.fetch_verified_email(epoch).await;
                Ok(())
            }
            Err(e) => Err(Self::land_passkey_failure(flight, &e)),
        }
    }

    /// Disconnects the active account.
    ///
    /// `Authenticated` → `LoggingOut` → `Unauthenticated`. The local session is
    /// cleared even if the backend disconnect fails; that failure is recorded in
    /// `last_error` as [`SessionError::LogoutBackendFailed`] but not returned.
    ///
    /// # Errors
    /// - [`SessionError::OperationInProgress`] if another operation is in flight.
    /// - [`SessionError::InvalidTransition`] unless `Authenticated`.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let account_id = self.begin(SessionSnapshot::begin_logout)?;
        let flight = Flight::new(self, "logout", SessionSnapshot::abort_logout);

        let failure = match self.backend.disconnect(account_id).await {
            Ok(()) => None,
            Err(e) => {
                log::error!("backend disconnect failed, clearing local session anyway: {e}");
                Some(SessionError::LogoutBackendFailed {
                    reason: e.to_string(),
                })
            }
        };
        flight.land(|state| state.snapshot.finish_logout(failure.as_ref()));
        log::info!("logged out");
        Ok(())
    }

    /// Re-derives the session from the backend at startup.
    ///
    /// Returns `true` if the backend still had an active account.
    /// A failing lookup is logged and leaves the session `Unauthenticated`.
    ///
    /// # Errors
    /// - [`SessionError::OperationInProgress`] if another operation is in flight.
    /// - [`SessionError::InvalidTransition`] unless `Unauthenticated`.
    pub async fn restore_session(&self) -> Result<bool, SessionError> {
        self.begin(SessionSnapshot::begin_restore)?;
        let flight = Flight::new(self, "restore_session", SessionSnapshot::abort_login);

        match self.backend.active_account().await {
            Ok(Some(account_id)) => {
                let epoch = Self::land_authenticated(flight, account_id);
                log::info!("restored active session");
                self.fetch_verified_email(epoch).await;
                Ok(true)
            }
            Ok(None) => {
                flight.land(|state| state.snapshot.abort_login());
                Ok(false)
            }
            Err(e) => {
                log::warn!("active account lookup failed: {e}");
                flight.land(|state| state.snapshot.abort_login());
                Ok(false)
            }
        }
    }

    /// Refreshes the native balance of `address`.
    ///
    /// An empty address is a no-op. Concurrent refreshes of the same address
    /// share one backend call. A failed query keeps the previous balance and
    /// records [`SessionError::BalanceUnavailable`] in `last_error`.
    ///
    /// # Errors
    /// [`SessionError::OperationInProgress`] if a refresh of a different address
    /// is outstanding, or the refresh this call joined was cancelled.
    pub async fn refresh_balance(
        &self,
        address: String,
    ) -> Result<BalanceRefresh, SessionError> {
        self.coalesced_refresh(address).await
    }
}

impl SessionController {
    /// Returns a receiver that always holds the latest snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `apply` to the state and publishes the snapshot if it changed.
    ///
    /// Leaving `Authenticated` always drops the balance and advances the epoch.
    fn update<R>(&self, apply: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock_state();
        let previous = state.snapshot.clone();
        let result = apply(&mut state);

        let changed = state.snapshot != previous;
        if changed {
            if previous.status == SessionStatus::Authenticated
                && state.snapshot.status != SessionStatus::Authenticated
            {
                state.snapshot.balance = None;
                state.epoch += 1;
            }
            state.snapshot.revision = previous.revision + 1;
            debug_assert!(
                state.snapshot.is_consistent(),
                "inconsistent snapshot: {:?}",
                state.snapshot
            );
            log::debug!(
                "session {} -> {} (revision {})",
                previous.status,
                state.snapshot.status,
                state.snapshot.revision
            );
            self.publish(&state.snapshot);
        }
        drop(state);

        if changed {
            self.deliver();
        }
        result
    }

    /// Called with the state lock held, so the queue is in revision order.
    fn publish(&self, snapshot: &SessionSnapshot) {
        self.updates.send_replace(snapshot.clone());
        self.lock_observers()
            .queue
            .push_back(Delivery::Broadcast(snapshot.clone()));
    }

    /// Hands queued snapshots to observers with no lock held.
    ///
    /// Returns immediately if another caller, or an observer callback further
    /// up this stack, is already draining; that caller delivers what we queued.
    fn deliver(&self) {
        {
            let mut observers = self.lock_observers();
            if observers.draining {
                return;
            }
            observers.draining = true;
        }
        let mut drain = Drain {
            controller: self,
            finished: false,
        };

        loop {
            let (snapshot, targets) = {
                let mut observers = self.lock_observers();
                match observers.queue.pop_front() {
                    None => {
                        // Cleared under the same lock that saw the queue empty,
                        // so nothing enqueued afterwards is stranded.
                        observers.draining = false;
                        drain.finished = true;
                        return;
                    }
                    Some(Delivery::Initial(observer, snapshot)) => (snapshot, vec![observer]),
                    Some(Delivery::Broadcast(snapshot)) => {
                        let targets = observers
                            .registered
                            .iter()
                            .filter(|registration| registration.since < snapshot.revision)
                            .map(|registration| registration.observer.clone())
                            .collect::<Vec<_>>();
                        (snapshot, targets)
                    }
                }
            };
            for observer in targets {
                observer.on_snapshot(snapshot.clone());
            }
        }
    }

    /// Runs a guard transition, recording its rejection in `last_error`.
    fn begin<T>(
        &self,
        guard: impl FnOnce(&mut SessionSnapshot) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        self.update(|state| {
            let outcome = guard(&mut state.snapshot);
            if let Err(error) = &outcome {
                log::debug!("rejected: {error}");
                state.snapshot.record(error);
            }
            outcome
        })
    }

    fn land_authenticated(flight: Flight<'_>, account_id: String) -> u64 {
        flight.land(|state| {
            state.snapshot.authenticate(account_id);
            state.epoch
        })
    }

    fn land_passkey_failure(flight: Flight<'_>, error: &BackendError) -> SessionError {
        log::warn!("passkey login failed: {error}");
        let error = SessionError::PasskeyFailed {
            reason: error.to_string(),
        };
        flight.land(|state| state.snapshot.fail_login(&error));
        error
    }

    /// Best-effort lookup of the verified email. Dropped if the session that
    /// issued it has ended by the time it resolves.
    async fn fetch_verified_email(&self, epoch: u64) {
        match self.backend.verified_email().await {
            Ok(Some(email)) => self.update(|state| {
                if state.epoch == epoch {
                    state.snapshot.attach_email(email);
                } else {
                    log::debug!("discarding email lookup for an ended session");
                }
            }),
            Ok(None) => log::debug!("backend has no verified email for this account"),
            Err(e) => log::warn!("verified email lookup failed: {e}"),
        }
    }
}
