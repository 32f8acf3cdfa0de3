//! Time-leased bearer token shared by every category pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::CredentialError;
use super::store::CredentialStore;
use crate::cloud::{GatewayError, RemoteGateway};
use crate::retry::{RetryAction, RetryExecutor};

/// How long an issued token is trusted before it is renewed.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10 * 60);

/// Longest accepted lease; longer values are clamped to it.
pub const MAX_LEASE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct LeaseState {
    token: Option<String>,
    /// `None` until the first successful refresh of this run.
    deadline: Option<Instant>,
    last_error: Option<CredentialError>,
}

impl LeaseState {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.map_or(true, |deadline| now >= deadline)
    }
}

/// Hands out a valid token to concurrent callers, refreshing it when the
/// lease runs out.
///
/// The state lock is held for the whole refresh, so at most one refresh is
/// in flight and callers that queued behind it see its outcome instead of
/// starting their own.
pub struct CredentialManager {
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<dyn CredentialStore>,
    executor: RetryExecutor,
    lease: Duration,
    state: Mutex<LeaseState>,
    completed_refreshes: AtomicU64,
    refreshed: Notify,
}

impl CredentialManager {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<dyn CredentialStore>,
        executor: RetryExecutor,
        lease: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            executor,
            lease: lease.min(MAX_LEASE),
            state: Mutex::new(LeaseState::default()),
            completed_refreshes: AtomicU64::new(0),
            refreshed: Notify::new(),
        }
    }

    /// Return a token that was refreshed within the current lease.
    ///
    /// The first call of a run loads the stored seed and exchanges it for a
    /// fresh token, so a stale seed is never used against the service.
    pub async fn get_credential(&self) -> Result<String, CredentialError> {
        let seen = self.completed_refreshes.load(Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if self.completed_refreshes.load(Ordering::SeqCst) != seen {
            if let Some(err) = &state.last_error {
                return Err(err.clone());
            }
        }

        if state.token.is_none() {
            let seed = self.store.load().await?.ok_or(CredentialError::NoSeed)?;
            tracing::debug!("Loaded stored token");
            state.token = Some(seed);
            self.refresh_locked(&mut state).await?;
        } else if state.is_expired(Instant::now()) {
            self.refresh_locked(&mut state).await?;
        }

        state.token.clone().ok_or(CredentialError::NoSeed)
    }

    /// Exchange the current token for a new one. Caller holds the lock.
    async fn refresh_locked(&self, state: &mut LeaseState) -> Result<(), CredentialError> {
        let current = state.token.clone().ok_or(CredentialError::NoSeed)?;
        tracing::info!("Refreshing access token");

        let gateway = &self.gateway;
        let current = current.as_str();
        let issued = self
            .executor
            .run("token refresh", classify, move || gateway.issue_credential(current))
            .await;

        let outcome = match issued {
            Ok(token) => match self.store.save(&token).await {
                Ok(()) => {
                    state.token = Some(token);
                    let now = Instant::now();
                    state.deadline = Some(now.checked_add(self.lease).unwrap_or(now));
                    tracing::debug!(lease_secs = self.lease.as_secs(), "Access token refreshed");
                    Ok(())
                }
                Err(e) => Err(CredentialError::from(e)),
            },
            Err(GatewayError::Relocated) => {
                tracing::error!("Stored token was rejected by the token endpoint; clearing it");
                if let Err(e) = self.store.save("").await {
                    tracing::warn!(error = %e, "Failed to clear stored token");
                }
                state.token = None;
                state.deadline = None;
                Err(CredentialError::Invalidated)
            }
            Err(e) => Err(CredentialError::Refresh(Arc::new(e))),
        };

        state.last_error = outcome.as_ref().err().cloned();
        self.completed_refreshes.fetch_add(1, Ordering::SeqCst);
        if outcome.is_ok() {
            self.refreshed.notify_one();
        }
        outcome
    }

    /// Renew the token in the background whenever its lease runs out, until
    /// `shutdown` fires. Failures are logged and the next caller of
    /// [`get_credential`](Self::get_credential) retries.
    pub fn spawn_refresher(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_refresher(shutdown).await })
    }

    async fn run_refresher(&self, shutdown: CancellationToken) {
        loop {
            let deadline = {
                let state = self.state.lock().await;
                state.deadline.filter(|_| state.last_error.is_none())
            };

            let wait = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => self.refreshed.notified().await,
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Token refresher stopped");
                    return;
                }
                _ = wait => {}
            }
            if deadline.is_none() {
                continue;
            }

            let mut state = self.state.lock().await;
            if state.token.is_some() && state.is_expired(Instant::now()) {
                if let Err(e) = self.refresh_locked(&mut state).await {
                    tracing::error!(error = %e, "Background token refresh failed");
                }
            }
        }
    }
}

fn classify(e: &GatewayError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}
