//! Balance refresh, coalesced per address.

use serde::Serialize;
use tokio::sync::watch;

use crate::error::{SessionError, SessionErrorKind};
use crate::snapshot::{Balance, SessionStatus};

use super::SessionController;

/// Outcome of [`SessionController::refresh_balance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Enum)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BalanceRefresh {
    /// The address was empty; nothing was queried.
    Skipped,
    /// The snapshot now holds this balance.
    Updated {
        /// The freshly fetched balance.
        balance: Balance,
    },
    /// The query failed. The previous balance is kept and the failure is in
    /// `last_error`, whatever the session status.
    Unavailable {
        /// Why the balance could not be fetched.
        reason: String,
    },
    /// The query succeeded but the session was not `Authenticated` in the same
    /// epoch for the whole query, so the balance was discarded.
    Superseded,
}

/// The balance query currently outstanding.
pub(super) struct BalanceFlight {
    id: u64,
    address: String,
    done: watch::Receiver<Option<BalanceRefresh>>,
}

enum Role {
    Leader {
        id: u64,
        epoch: u64,
        started_authenticated: bool,
        done: watch::Sender<Option<BalanceRefresh>>,
    },
    Follower(watch::Receiver<Option<BalanceRefresh>>),
}

/// Clears the balance flight if the leader is dropped before it lands.
struct BalanceFlightGuard<'a> {
    controller: &'a SessionController,
    id: u64,
    armed: bool,
}

impl Drop for BalanceFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::warn!("balance refresh cancelled while waiting on the backend");
        let id = self.id;
        self.controller.update(|state| {
            if state.balance_flight.as_ref().is_some_and(|flight| flight.id == id) {
                state.balance_flight = None;
                state.snapshot.refreshing_balance = false;
            }
        });
    }
}

impl SessionController {
    pub(super) async fn coalesced_refresh(
        &self,
        address: String,
    ) -> Result<BalanceRefresh, SessionError> {
        let address = address.trim().to_string();
        if address.is_empty() {
            return Ok(BalanceRefresh::Skipped);
        }

        let role = self.update(|state| match &state.balance_flight {
            Some(flight) if flight.address == address => {
                Ok(Role::Follower(flight.done.clone()))
            }
            Some(_) => Err(SessionError::OperationInProgress),
            None => {
                let id = state.next_flight_id;
                state.next_flight_id += 1;
                let (done, receiver) = watch::channel(None);
                state.balance_flight = Some(BalanceFlight {
                    id,
                    address: address.clone(),
                    done: receiver,
                });
                state.snapshot.refreshing_balance = true;
                Ok(Role::Leader {
                    id,
                    epoch: state.epoch,
                    started_authenticated: state.snapshot.status
                        == SessionStatus::Authenticated,
                    done,
                })
            }
        })?;

        match role {
            Role::Follower(mut done) => {
                log::debug!("joining outstanding balance refresh");
                let outcome = done
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| SessionError::OperationInProgress)?;
                outcome.clone().ok_or(SessionError::OperationInProgress)
            }
            Role::Leader {
                id,
                epoch,
                started_authenticated,
                done,
            } => {
                let mut guard = BalanceFlightGuard {
                    controller: self,
                    id,
                    armed: true,
                };
                let result = self
                    .balances
                    .query_balance(self.chain.clone(), address)
                    .await;

                guard.armed = false;
                let outcome = self.update(|state| {
                    state.balance_flight = None;
                    state.snapshot.refreshing_balance = false;

                    let balance = match result {
                        Ok(balance) => balance,
                        Err(e) => {
                            log::warn!("balance query failed: {e}");
                            let reason = e.to_string();
                            state.snapshot.record(&SessionError::BalanceUnavailable {
                                reason: reason.clone(),
                            });
                            return BalanceRefresh::Unavailable { reason };
                        }
                    };

                    // A balance only attaches to the session it was queried for.
                    let current = started_authenticated
                        && state.epoch == epoch
                        && state.snapshot.status == SessionStatus::Authenticated;
                    if !current {
                        log::debug!("discarding balance for an ended session");
                        return BalanceRefresh::Superseded;
                    }

                    state.snapshot.balance = Some(balance.clone());
                    if state
                        .snapshot
                        .last_error
                        .as_ref()
                        .is_some_and(|e| e.kind == SessionErrorKind::BalanceUnavailable)
                    {
                        state.snapshot.last_error = None;
                    }
                    BalanceRefresh::Updated { balance }
                });
                done.send_replace(Some(outcome.clone()));
                Ok(outcome)
            }
        }
    }
}
