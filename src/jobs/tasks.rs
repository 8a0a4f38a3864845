/// Background task implementations
use crate::{context::AppContext, error::ApiResult};

/// Rows removed by one retention sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub revoked_tokens: u64,
    pub refresh_tokens: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.revoked_tokens + self.refresh_tokens
    }
}

/// Delete revocation and refresh-token rows past their expiry
///
/// Expired tokens already fail verification, so their rows carry no
/// information. Runs as one unit of work.
pub async fn purge_expired_tokens(ctx: &AppContext) -> ApiResult<PurgeReport> {
    let mut tx = ctx.db.begin().await?;
    let revoked_tokens = ctx.revocations.purge_expired(&mut tx).await?;
    let refresh_tokens = ctx.refresh_tokens.purge_expired(&mut tx).await?;
    tx.commit().await?;

    Ok(PurgeReport {
        revoked_tokens,
        refresh_tokens,
    })
}
