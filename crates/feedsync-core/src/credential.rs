//! Bearer credential handed to the session from outside. Issuing and
//! renewing tokens is somebody else's job; the feed only needs the current
//! token and a signal when it stops being valid.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Valid,
    Expired,
}

pub trait CredentialHolder: Send + Sync {
    /// Current bearer token, `None` once expired.
    fn bearer(&self) -> Option<Token>;

    /// Receiver that flips to `Expired` exactly once.
    fn expiry(&self) -> watch::Receiver<CredentialState>;
}

/// Token with a fixed lifetime, expiring on its own once the deadline passes.
pub struct SessionCredential {
    token: Token,
    expires_at: Instant,
    state: watch::Sender<CredentialState>,
}

impl SessionCredential {
    pub fn new(token: Token, ttl: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(CredentialState::Valid);
        Arc::new(Self {
            token,
            expires_at: Instant::now() + ttl,
            state,
        })
    }

    /// Spawns the timer that expires the credential at its deadline.
    pub fn start_expiry_timer(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let credential = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(credential.expires_at).await;
            tracing::info!("session credential expired");
            credential.expire();
        })
    }

    pub fn expire(&self) {
        self.state.send_replace(CredentialState::Expired);
    }
}

impl CredentialHolder for SessionCredential {
    fn bearer(&self) -> Option<Token> {
        if *self.state.borrow() == CredentialState::Expired || Instant::now() >= self.expires_at {
            return None;
        }
        Some(self.token.clone())
    }

    fn expiry(&self) -> watch::Receiver<CredentialState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bearer_is_available_until_expired() {
        let credential = SessionCredential::new(Token::new("abc"), Duration::from_secs(60));
        assert_eq!(credential.bearer(), Some(Token::new("abc")));

        let mut expiry = credential.expiry();
        credential.expire();
        expiry.changed().await.unwrap();
        assert_eq!(*expiry.borrow(), CredentialState::Expired);
        assert_eq!(credential.bearer(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_credential_at_deadline() {
        let credential = SessionCredential::new(Token::new("abc"), Duration::from_secs(3600));
        let mut expiry = credential.expiry();
        let _timer = credential.start_expiry_timer();

        tokio::time::advance(Duration::from_secs(3601)).await;
        expiry.changed().await.unwrap();
        assert_eq!(*expiry.borrow(), CredentialState::Expired);
        assert!(credential.bearer().is_none());
    }

    #[test]
    fn token_debug_hides_secret() {
        assert_eq!(format!("{:?}", Token::new("secret")), "Token(***)");
    }
}
