use super::{SettlementError, SettlementGateway, VerifiedDeposit};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP adapter for an external settlement service. Confirmation depth is
/// enforced here, on top of whatever the service reports.
pub struct HttpSettlementGateway {
    client: Client,
    base_url: String,
    min_confirmations: u32,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    reference: &'a str,
    destination: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    accepted: bool,
    sender: Option<String>,
    amount: Option<Decimal>,
    confirmations: Option<u32>,
    reason: Option<String>,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    destination: &'a str,
    amount: Decimal,
}

#[derive(Deserialize)]
struct TransferResponse {
    tx_reference: String,
}

fn map_transport_err(e: reqwest::Error) -> SettlementError {
    if e.is_timeout() {
        SettlementError::Timeout(e.to_string())
    } else {
        SettlementError::Unavailable(e.to_string())
    }
}

/// Deposit acceptance rule, split out so it is testable without a server.
fn accept_deposit(
    response: VerifyResponse,
    minimum_amount: Decimal,
    min_confirmations: u32,
) -> Result<VerifiedDeposit, SettlementError> {
    if !response.accepted {
        return Err(SettlementError::Rejected(
            response
                .reason
                .unwrap_or_else(|| "transfer not found".to_string()),
        ));
    }
    let (Some(sender), Some(amount)) = (response.sender, response.amount) else {
        return Err(SettlementError::Rejected(
            "verification response missing sender or amount".to_string(),
        ));
    };
    let confirmations = response.confirmations.unwrap_or(0);
    if confirmations < min_confirmations {
        return Err(SettlementError::Rejected(format!(
            "insufficient confirmations: {confirmations} < {min_confirmations}"
        )));
    }
    if amount < minimum_amount {
        return Err(SettlementError::Rejected(format!(
            "amount {amount} below required {minimum_amount}"
        )));
    }
    Ok(VerifiedDeposit {
        sender,
        amount,
        confirmations,
    })
}

impl HttpSettlementGateway {
    pub fn new(base_url: String, min_confirmations: u32, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            min_confirmations,
        }
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    async fn verify_inbound(
        &self,
        reference: &str,
        expected_destination: &str,
        minimum_amount: Decimal,
    ) -> Result<VerifiedDeposit, SettlementError> {
        let url = format!("{}/v1/transfers/verify", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&VerifyRequest {
                reference,
                destination: expected_destination,
            })
            .send()
            .await
            .map_err(map_transport_err)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SettlementError::Unavailable(format!(
                "verify returned {status}: {body}"
            )));
        }

        let parsed: VerifyResponse = serde_json::from_str(&body)
            .map_err(|e| SettlementError::Unavailable(format!("bad verify response: {e}")))?;

        accept_deposit(parsed, minimum_amount, self.min_confirmations)
    }

    async fn send_value(
        &self,
        destination: &str,
        amount: Decimal,
    ) -> Result<String, SettlementError> {
        let url = format!("{}/v1/transfers", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&TransferRequest {
                destination,
                amount,
            })
            .send()
            .await
            .map_err(map_transport_err)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SettlementError::TransferFailed(format!(
                "transfer returned {status}: {body}"
            )));
        }

        let parsed: TransferResponse = serde_json::from_str(&body)
            .map_err(|e| SettlementError::Unavailable(format!("bad transfer response: {e}")))?;

        Ok(parsed.tx_reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn verified(amount: Decimal, confirmations: u32) -> VerifyResponse {
        VerifyResponse {
            accepted: true,
            sender: Some("0xsender".to_string()),
            amount: Some(amount),
            confirmations: Some(confirmations),
            reason: None,
        }
    }

    #[test]
    fn given_sufficient_deposit_when_accept_should_return_details() {
        let deposit = accept_deposit(verified(dec!(2.0), 12), dec!(2.0), 12).unwrap();
        assert_eq!(deposit.sender, "0xsender");
        assert_eq!(deposit.amount, dec!(2.0));
    }

    #[test]
    fn given_shallow_confirmations_when_accept_should_reject() {
        let err = accept_deposit(verified(dec!(2.0), 5), dec!(2.0), 12).unwrap_err();
        assert!(matches!(err, SettlementError::Rejected(_)));
    }

    #[test]
    fn given_underpayment_when_accept_should_reject() {
        let err = accept_deposit(verified(dec!(1.5), 12), dec!(2.0), 12).unwrap_err();
        assert!(matches!(err, SettlementError::Rejected(_)));
    }

    #[test]
    fn given_overpayment_when_accept_should_allow() {
        let deposit = accept_deposit(verified(dec!(3.0), 12), dec!(2.0), 12).unwrap();
        assert_eq!(deposit.amount, dec!(3.0));
    }

    #[test]
    fn given_unaccepted_transfer_when_accept_should_reject_with_reason() {
        let response = VerifyResponse {
            accepted: false,
            sender: None,
            amount: None,
            confirmations: None,
            reason: Some("unknown reference".to_string()),
        };
        let err = accept_deposit(response, dec!(2.0), 12).unwrap_err();
        assert!(matches!(err, SettlementError::Rejected(reason) if reason == "unknown reference"));
    }
}
