//! Out-of-band password mediation.
//!
//! A running shell loop that hits an interactive prompt parks here while the
//! upstream client is asked for a secret via its own tool call. Each pending
//! request owns a single-shot delivery slot: fulfillment, cancellation, and
//! timeout are mutually exclusive outcomes, and the entry is removed before
//! the waiting caller resumes.

use chrono::Utc;
use secrecy::SecretString;
use shellgate_types::{PasswordRequestInfo, PromptKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// How often the background housekeeper sweeps expired requests. Kept at or
/// below half the default request timeout.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(30);

struct PendingRequest {
    info: PasswordRequestInfo,
    slot: oneshot::Sender<Option<SecretString>>,
}

/// Fields identifying the session and command a request belongs to.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub host: String,
    pub username: String,
    pub command: String,
}

#[derive(Default)]
pub struct PasswordBroker {
    pending: Mutex<HashMap<Uuid, PendingRequest>>,
}

impl PasswordBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the caller until a password arrives, the request is cancelled,
    /// or `timeout` elapses. `None` means no password is available and the
    /// caller must treat the prompt as unanswerable.
    pub async fn request_password(
        &self,
        prompt_text: &str,
        prompt_type: PromptKind,
        context: &RequestContext,
        timeout: Duration,
    ) -> Option<SecretString> {
        let request_id = Uuid::new_v4();
        let info = PasswordRequestInfo {
            request_id,
            prompt_text: prompt_text.to_string(),
            prompt_type,
            session_id: context.session_id.clone(),
            host: context.host.clone(),
            username: context.username.clone(),
            command: context.command.clone(),
            created_at: Utc::now(),
            timeout_seconds: timeout.as_secs(),
        };

        let (slot, receiver) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id, PendingRequest { info, slot });

        tracing::info!(
            request_id = %request_id,
            session_id = %context.session_id,
            prompt_type = %prompt_type,
            "password request pending"
        );

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(password)) => password,
            // Sender dropped: the request was swept as expired.
            Ok(Err(_)) => None,
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                tracing::warn!(request_id = %request_id, "password request timed out");
                None
            }
        }
    }

    /// Fulfill a pending request. Returns false when the id is unknown or
    /// the request was already resolved.
    pub async fn provide_password(&self, request_id: Uuid, password: SecretString) -> bool {
        let entry = self.pending.lock().await.remove(&request_id);
        match entry {
            Some(pending) => pending.slot.send(Some(password)).is_ok(),
            None => false,
        }
    }

    /// Resolve a pending request with no password.
    pub async fn cancel_request(&self, request_id: Uuid) -> bool {
        let entry = self.pending.lock().await.remove(&request_id);
        match entry {
            Some(pending) => {
                let _ = pending.slot.send(None);
                tracing::info!(request_id = %request_id, "password request cancelled");
                true
            }
            None => false,
        }
    }

    /// Point-in-time snapshot of pending requests for operator visibility.
    pub async fn list_pending(&self) -> Vec<PasswordRequestInfo> {
        self.pending
            .lock()
            .await
            .values()
            .map(|p| p.info.clone())
            .collect()
    }

    /// Drop requests older than their own timeout. Their waiters observe a
    /// closed slot and resume with `None`.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.lock().await;
        let expired: Vec<Uuid> = pending
            .iter()
            .filter(|(_, p)| {
                let age = now.signed_duration_since(p.info.created_at);
                age.num_seconds() >= p.info.timeout_seconds as i64
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            pending.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "swept expired password requests");
        }
        expired.len()
    }

    /// Background housekeeper; runs until the process exits.
    pub async fn run_sweeper(self: Arc<Self>) {
        loop {
            tokio::time::sleep(SWEEP_PERIOD).await;
            self.sweep_expired().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn context() -> RequestContext {
        RequestContext {
            session_id: "s1".to_string(),
            host: "example.com".to_string(),
            username: "admin".to_string(),
            command: "sudo id".to_string(),
        }
    }

    #[tokio::test]
    async fn test_provide_fulfills_waiter() {
        let broker = Arc::new(PasswordBroker::new());

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .request_password(
                        "[sudo] password for admin:",
                        PromptKind::Sudo,
                        &context(),
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        // Wait until the request is visible, then answer it.
        let request_id = loop {
            let pending = broker.list_pending().await;
            if let Some(req) = pending.first() {
                assert_eq!(req.prompt_type, PromptKind::Sudo);
                assert_eq!(req.session_id, "s1");
                break req.request_id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert!(
            broker
                .provide_password(request_id, SecretString::new("pw".to_string()))
                .await
        );
        let delivered = waiter.await.unwrap();
        assert_eq!(delivered.unwrap().expose_secret(), "pw");

        // Fulfilled requests are gone; a second provide returns false.
        assert!(broker.list_pending().await.is_empty());
        assert!(
            !broker
                .provide_password(request_id, SecretString::new("again".to_string()))
                .await
        );
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_none() {
        let broker = Arc::new(PasswordBroker::new());

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .request_password(
                        "Password:",
                        PromptKind::Interactive,
                        &context(),
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        let request_id = loop {
            if let Some(req) = broker.list_pending().await.first() {
                break req.request_id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert!(broker.cancel_request(request_id).await);
        assert!(waiter.await.unwrap().is_none());
        // Second cancel finds nothing.
        assert!(!broker.cancel_request(request_id).await);
    }

    #[tokio::test]
    async fn test_timeout_yields_none_and_clears_entry() {
        let broker = PasswordBroker::new();
        let delivered = broker
            .request_password(
                "Password:",
                PromptKind::Interactive,
                &context(),
                Duration::from_millis(50),
            )
            .await;
        assert!(delivered.is_none());
        assert!(broker.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expires_old_requests() {
        let broker = PasswordBroker::new();

        // Plant a request whose creation time is already past its timeout.
        let request_id = Uuid::new_v4();
        let (slot, receiver) = oneshot::channel();
        let info = PasswordRequestInfo {
            request_id,
            prompt_text: "Password:".to_string(),
            prompt_type: PromptKind::Interactive,
            session_id: "s1".to_string(),
            host: "example.com".to_string(),
            username: "admin".to_string(),
            command: "sudo id".to_string(),
            created_at: Utc::now() - chrono::Duration::seconds(120),
            timeout_seconds: 60,
        };
        broker
            .pending
            .lock()
            .await
            .insert(request_id, PendingRequest { info, slot });

        assert_eq!(broker.sweep_expired().await, 1);
        assert!(broker.list_pending().await.is_empty());
        // The waiter side observes a closed slot.
        assert!(receiver.await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_request_id() {
        let broker = PasswordBroker::new();
        assert!(
            !broker
                .provide_password(Uuid::new_v4(), SecretString::new("pw".to_string()))
                .await
        );
        assert!(!broker.cancel_request(Uuid::new_v4()).await);
    }
}
