/// Signed transaction webhooks
///
/// Deliveries are checked against a shared-secret digest before anything
/// touches storage, then applied to the target account exactly once.

pub mod ingestion;
pub mod payload;
pub mod signature;

pub use ingestion::{IngestionOutcome, TransactionIngestion};
pub use payload::WebhookPayload;
pub use signature::{parse_fields, SignatureVerifier, WebhookFields};
