//! 402 payment challenge — issued fresh per request, never cached.

use serde::{Deserialize, Serialize};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Convert a SOL amount to lamports.
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL).round() as u64
}

/// Convert lamports to SOL for display.
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL
}

/// The payment terms returned instead of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChallenge {
    pub address: String,
    /// Price in SOL.
    pub amount: f64,
    pub currency: String,
    pub chain: String,
}

impl PaymentChallenge {
    /// Issue a fresh challenge. Stateless by design: the server records
    /// nothing about which challenge went to which requester (the verifier
    /// re-checks the chain on every credential presentation instead).
    pub fn issue(receiver: &str, amount_sol: f64) -> Self {
        Self {
            address: receiver.to_string(),
            amount: amount_sol,
            currency: "SOL".into(),
            chain: "solana-devnet".into(),
        }
    }

    /// The expected payment in lamports.
    pub fn expected_lamports(&self) -> u64 {
        sol_to_lamports(self.amount)
    }

    /// The wire body of a 402 response.
    pub fn to_response_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": "Payment Required",
            "payment_info": {
                "address": self.address,
                "amount": self.amount,
                "currency": self.currency,
                "chain": self.chain,
            }
        })
    }

    /// Parse a 402 response body back into a challenge (payer side).
    pub fn from_response_body(v: &serde_json::Value) -> Option<Self> {
        let info = v.get("payment_info")?;
        Some(Self {
            address: info.get("address")?.as_str()?.to_string(),
            amount: info.get("amount")?.as_f64()?,
            currency: info
                .get("currency")
                .and_then(|c| c.as_str())
                .unwrap_or("SOL")
                .to_string(),
            chain: info
                .get("chain")
                .and_then(|c| c.as_str())
                .unwrap_or("solana-devnet")
                .to_string(),
        })
    }
}

/// Result of fetching a possibly-paywalled source, returned normally instead
/// of signalled through an error path.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The source yielded items.
    Content(Vec<serde_json::Value>),
    /// The source wants paying first.
    PaymentRequired(PaymentChallenge),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamports_conversion() {
        assert_eq!(sol_to_lamports(0.01), 10_000_000);
        assert_eq!(sol_to_lamports(1.0), 1_000_000_000);
        assert_eq!(lamports_to_sol(10_000_000), 0.01);
    }

    #[test]
    fn test_wire_roundtrip() {
        let challenge = PaymentChallenge::issue("ADDR1", 0.01);
        let body = challenge.to_response_body();
        assert_eq!(body["error"], "Payment Required");
        assert_eq!(body["payment_info"]["currency"], "SOL");

        let parsed = PaymentChallenge::from_response_body(&body).unwrap();
        assert_eq!(parsed, challenge);
        assert_eq!(parsed.expected_lamports(), 10_000_000);
    }
}
