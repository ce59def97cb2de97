//! Bounded, concurrent collection of sessions.
//!
//! The registry's coarse lock guards the two maps (sessions and creation
//! times); disconnects happen after the lock is released so a slow remote
//! cannot stall unrelated registry operations.

use crate::broker::PasswordBroker;
use crate::session::Session;
use crate::SessionError;
use chrono::{DateTime, Utc};
use shellgate_policy::PolicyEngine;
use shellgate_types::config::GatewayConfig;
use shellgate_types::SessionInfo;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How often expired sessions are swept.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(300);

/// Back-off after a sweep error.
const SWEEP_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, Arc<Session>>,
    created: HashMap<String, DateTime<Utc>>,
}

pub struct SessionRegistry {
    config: Arc<GatewayConfig>,
    policy: Arc<PolicyEngine>,
    broker: Arc<PasswordBroker>,
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<GatewayConfig>,
        policy: Arc<PolicyEngine>,
        broker: Arc<PasswordBroker>,
    ) -> Self {
        Self {
            config,
            policy,
            broker,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Allocate a session. Fails on id collision; at capacity, the session
    /// with the earliest creation time is evicted first.
    pub async fn create_session(
        &self,
        session_id: &str,
        host: &str,
        port: u16,
        username: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let (evicted, session) = {
            let mut inner = self.inner.lock().await;
            if inner.sessions.contains_key(session_id) {
                return Err(SessionError::DuplicateSession(session_id.to_string()));
            }

            let mut evicted = None;
            if inner.sessions.len() >= self.config.security.max_sessions {
                if let Some(oldest) = inner
                    .created
                    .iter()
                    .min_by_key(|(_, created)| **created)
                    .map(|(id, _)| id.clone())
                {
                    tracing::warn!(
                        session_id = %oldest,
                        "session limit reached, evicting oldest session"
                    );
                    evicted = inner.sessions.remove(&oldest);
                    inner.created.remove(&oldest);
                }
            }

            let session = Arc::new(Session::new(
                session_id.to_string(),
                host.to_string(),
                port,
                username.to_string(),
                self.config.clone(),
                self.policy.clone(),
                self.broker.clone(),
            ));
            inner.sessions.insert(session_id.to_string(), session.clone());
            inner.created.insert(session_id.to_string(), Utc::now());
            tracing::info!(
                session_id = %session_id,
                "created session for {username}@{host}:{port}"
            );
            (evicted, session)
        };

        // Disconnect the evicted session outside the registry lock.
        if let Some(old) = evicted {
            if let Err(e) = old.disconnect().await {
                tracing::warn!(session_id = %old.id(), "evicted session disconnect failed: {e}");
            }
        }
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner.lock().await.sessions.get(session_id).cloned()
    }

    /// Remove a session, disconnecting it if needed. Returns false when
    /// the id is unknown.
    pub async fn remove_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.created.remove(session_id);
            inner.sessions.remove(session_id)
        };
        match removed {
            Some(session) => {
                session.disconnect().await?;
                tracing::info!(session_id = %session_id, "removed session");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Point-in-time snapshot of session info records.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> =
            self.inner.lock().await.sessions.values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos
    }

    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Remove every session whose creation age exceeds the configured TTL.
    pub async fn cleanup_expired(&self) -> Result<usize, SessionError> {
        let ttl = chrono::Duration::hours(self.config.security.session_ttl_hours as i64);
        let now = Utc::now();

        let expired: Vec<Arc<Session>> = {
            let mut inner = self.inner.lock().await;
            let ids: Vec<String> = inner
                .created
                .iter()
                .filter(|(_, created)| now.signed_duration_since(**created) >= ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| {
                    inner.created.remove(id);
                    inner.sessions.remove(id)
                })
                .collect()
        };

        let count = expired.len();
        let mut first_error = None;
        for session in expired {
            tracing::info!(session_id = %session.id(), "session expired");
            if let Err(e) = session.disconnect().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                if count > 0 {
                    tracing::info!(count, "cleaned up expired sessions");
                }
                Ok(count)
            }
        }
    }

    /// Administrative shutdown: disconnect everything, keep nothing.
    pub async fn disconnect_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let mut inner = self.inner.lock().await;
            inner.created.clear();
            inner.sessions.drain().map(|(_, s)| s).collect()
        };
        let count = sessions.len();
        for session in sessions {
            if let Err(e) = session.disconnect().await {
                tracing::warn!(session_id = %session.id(), "disconnect failed during shutdown: {e}");
            }
        }
        tracing::info!(count, "disconnected all sessions");
        count
    }

    /// Background sweeper; backs off for a minute after an error.
    pub async fn run_sweeper(self: Arc<Self>) {
        loop {
            tokio::time::sleep(SWEEP_PERIOD).await;
            if let Err(e) = self.cleanup_expired().await {
                tracing::error!("session cleanup error: {e}");
                tokio::time::sleep(SWEEP_BACKOFF).await;
            }
        }
    }
}
