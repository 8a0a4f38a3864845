/// Exactly-once application of signed transactions to account balances
use super::{
    payload::WebhookPayload,
    signature::{parse_fields, SignatureVerifier},
};
use crate::{
    db::{
        accounts,
        models::{fits_amount_column, to_fixed, Transaction},
        transactions,
    },
    error::{ApiError, ApiResult},
    metrics,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

/// Result of a newly applied transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionOutcome {
    pub transaction_id: String,
    pub account_id: i64,
    pub balance: Decimal,
}

#[derive(Clone)]
pub struct TransactionIngestion {
    pool: SqlitePool,
    verifier: SignatureVerifier,
}

impl TransactionIngestion {
    pub fn new(pool: SqlitePool, verifier: SignatureVerifier) -> Self {
        Self { pool, verifier }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Verify, parse and apply one raw webhook body
    pub async fn ingest(&self, body: &[u8]) -> ApiResult<IngestionOutcome> {
        let result = self.ingest_inner(body).await;
        metrics::record_webhook_delivery(match &result {
            Ok(_) => "applied",
            Err(ApiError::SignatureInvalid) => "invalid_signature",
            Err(ApiError::DuplicateTransaction(_)) => "duplicate",
            Err(ApiError::Validation(_)) => "invalid_payload",
            Err(ApiError::NotFound(_)) => "not_found",
            Err(_) => "error",
        });
        result
    }

    async fn ingest_inner(&self, body: &[u8]) -> ApiResult<IngestionOutcome> {
        let fields = parse_fields(body)?;
        if !self.verifier.verify(&fields) {
            tracing::warn!("webhook rejected: signature mismatch");
            return Err(ApiError::SignatureInvalid);
        }

        let payload = WebhookPayload::from_fields(&fields)?;
        self.apply(&payload).await
    }

    /// Apply a verified payload in one database transaction
    ///
    /// The account upsert is the first statement so the write lock is held
    /// from before the duplicate check until commit; concurrent deliveries to
    /// any account serialize here. Dropping the transaction on an early
    /// return or cancellation rolls everything back.
    pub async fn apply(&self, payload: &WebhookPayload) -> ApiResult<IngestionOutcome> {
        let mut tx = self.pool.begin().await?;

        let account = accounts::lock_or_create(&mut tx, payload.account_id, payload.user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        if transactions::exists(&mut tx, &payload.transaction_id).await? {
            tracing::info!(
                transaction_id = %payload.transaction_id,
                "webhook rejected: duplicate transaction"
            );
            return Err(ApiError::DuplicateTransaction(payload.transaction_id.clone()));
        }

        if account.user_id != payload.user_id {
            return Err(ApiError::invalid_field(
                "account_id",
                "Account belongs to a different user",
            ));
        }

        let balance = account
            .balance
            .checked_add(payload.amount)
            .map(to_fixed)
            .filter(|balance| fits_amount_column(*balance))
            .ok_or_else(|| ApiError::invalid_field("amount", "Resulting balance is out of range"))?;

        transactions::insert(
            &mut tx,
            &Transaction {
                id: payload.transaction_id.clone(),
                user_id: payload.user_id,
                account_id: payload.account_id,
                amount: payload.amount,
                signature: payload.signature.clone(),
            },
        )
        .await?;

        accounts::update_balance(&mut tx, account.id, balance).await?;

        tx.commit().await?;

        tracing::info!(
            transaction_id = %payload.transaction_id,
            account_id = account.id,
            amount = %payload.amount,
            balance = %balance,
            "transaction applied"
        );

        Ok(IngestionOutcome {
            transaction_id: payload.transaction_id.clone(),
            account_id: account.id,
            balance,
        })
    }
}
