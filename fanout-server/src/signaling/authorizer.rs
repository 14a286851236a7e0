use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed,
    Denied,
}

/// Decides whether a user may join a session.
///
/// The call is abandoned at `deadline`; an implementation that outlives it is
/// treated as a failure, not a denial.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn authorize(&self, user_id: &str, session_id: &str, deadline: Instant) -> Result<AuthDecision>;
}

/// Admits everyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, user_id: &str, session_id: &str, _deadline: Instant) -> Result<AuthDecision> {
        info!(user_id = %user_id, session = %session_id, "Authorizing join");
        Ok(AuthDecision::Allowed)
    }
}
