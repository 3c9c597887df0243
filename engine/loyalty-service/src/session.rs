//! Session directory with expiry and a background sweeper

use crate::config::SessionConfig;
use crate::order::Principal;
use crate::{LoyaltyServiceError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Session binds an opaque token to a principal until `expires_at`
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is dead from its expiry instant onwards
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of resolving a token
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    Active(Session),
    Expired,
    NotFound,
}

/// In-memory token directory
pub struct SessionDirectory {
    sessions: Arc<DashMap<String, Session>>,
    ttl: chrono::Duration,
    sweep_interval: Duration,
    sweeper: parking_lot::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SessionDirectory {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Result<Self> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| LoyaltyServiceError::InvalidConfig {
            message: format!("session ttl {:?} is out of range", ttl),
        })?;
        if sweep_interval.is_zero() {
            return Err(LoyaltyServiceError::InvalidConfig {
                message: "session sweep interval must be positive".to_string(),
            });
        }

        Ok(Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
            sweep_interval,
            sweeper: parking_lot::Mutex::new(None),
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::new(config.ttl(), config.sweep_interval())
    }

    /// Issue a fresh session for a principal
    pub fn create(&self, principal: Principal) -> Session {
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            principal,
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        tracing::debug!("Created session for {}", session.principal);
        session
    }

    pub fn lookup(&self, token: &str) -> SessionLookup {
        self.lookup_at(token, Utc::now())
    }

    /// Resolve a token as of `now`; an expired entry is removed on the spot
    pub fn lookup_at(&self, token: &str, now: DateTime<Utc>) -> SessionLookup {
        let session = match self.sessions.get(token) {
            Some(entry) => entry.value().clone(),
            None => return SessionLookup::NotFound,
        };

        if session.is_expired_at(now) {
            self.sessions.remove_if(token, |_, s| s.is_expired_at(now));
            return SessionLookup::Expired;
        }
        SessionLookup::Active(session)
    }

    /// Remove every expired session, returning how many went away
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.sessions, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Spawn the periodic sweep; it stops when `shutdown` or `stop_sweeper` fires
    ///
    /// Calling this while a sweeper is already running does nothing.
    pub fn start_sweeper(&self, shutdown: &CancellationToken) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let cancel = shutdown.child_token();
        let sessions = Arc::clone(&self.sessions);
        let period = self.sweep_interval;
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("Session sweeper started (every {:?})", period);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = sweep_expired(&sessions, Utc::now());
                        if removed > 0 {
                            tracing::debug!("Swept {} expired sessions", removed);
                        }
                    }
                    _ = token.cancelled() => {
                        tracing::info!("Session sweeper received shutdown signal");
                        return;
                    }
                }
            }
        });

        *sweeper = Some((cancel, handle));
    }

    /// Cancel the sweeper and wait for it to finish
    pub async fn stop_sweeper(&self) {
        let running = self.sweeper.lock().take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!("Session sweeper ended abnormally: {}", e);
            }
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper.lock().as_ref().map(|(_, handle)| !handle.is_finished()).unwrap_or(false)
    }
}

impl Drop for SessionDirectory {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.sweeper.get_mut().take() {
            cancel.cancel();
        }
    }
}

fn sweep_expired(sessions: &DashMap<String, Session>, now: DateTime<Utc>) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| !session.is_expired_at(now));
    before.saturating_sub(sessions.len())
}
