//! Settlement boundary: deposit verification and outbound value transfer.
//! The chain itself lives behind an external settlement service; this module
//! only defines the capability and ships an HTTP adapter for it.

mod http_gateway;

pub use http_gateway::HttpSettlementGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("verification rejected: {0}")]
    Rejected(String),
    #[error("transfer failed: {0}")]
    TransferFailed(String),
    #[error("gateway timeout: {0}")]
    Timeout(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// A verified inbound transfer: who sent it, how much arrived, and how deep
/// it is buried in the chain.
#[derive(Debug, Clone)]
pub struct VerifiedDeposit {
    pub sender: String,
    pub amount: Decimal,
    pub confirmations: u32,
}

/// External value-transfer capability.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Verify an inbound transfer reached `expected_destination` for at
    /// least `minimum_amount`, with enough confirmations to be trusted.
    async fn verify_inbound(
        &self,
        reference: &str,
        expected_destination: &str,
        minimum_amount: Decimal,
    ) -> Result<VerifiedDeposit, SettlementError>;

    /// Send `amount` to `destination`; returns the transaction reference.
    async fn send_value(
        &self,
        destination: &str,
        amount: Decimal,
    ) -> Result<String, SettlementError>;
}
