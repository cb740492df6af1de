//! Public ledger access for payment reconciliation.
//!
//! [`LedgerClient`] is the seam the reconciler talks to; [`BlockExplorerClient`]
//! implements it against a blockchain.info-style raw transaction API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use appmine_core::error::LedgerError;
use appmine_core::types::LedgerOutput;

use crate::config::LedgerConfig;

/// Source of transaction outputs.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Every addressed output of `transaction_id`, in ledger order.
    async fn transaction_outputs(&self, transaction_id: &str)
        -> Result<Vec<LedgerOutput>, LedgerError>;
}

#[derive(Deserialize)]
struct RawTransaction {
    out: Vec<RawOutput>,
}

#[derive(Deserialize)]
struct RawOutput {
    addr: Option<String>,
    value: u64,
}

/// HTTP client for a raw-transaction JSON API.
pub struct BlockExplorerClient {
    client: Client,
    api_base: String,
    output_limit: u32,
}

impl BlockExplorerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LedgerError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            output_limit: config.output_limit,
        })
    }

    /// Request URL for a transaction.
    pub fn transaction_endpoint(&self, transaction_id: &str) -> String {
        format!(
            "{}/{}?limit={}",
            self.api_base, transaction_id, self.output_limit
        )
    }
}

#[async_trait]
impl LedgerClient for BlockExplorerClient {
    async fn transaction_outputs(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<LedgerOutput>, LedgerError> {
        let url = self.transaction_endpoint(transaction_id);
        debug!(%url, "fetching transaction");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LedgerError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_outputs(&body)
    }
}

/// Decode a raw transaction body into addressed outputs.
///
/// Outputs without an address (e.g. `OP_RETURN`) are dropped.
pub fn parse_outputs(body: &str) -> Result<Vec<LedgerOutput>, LedgerError> {
    let tx: RawTransaction =
        serde_json::from_str(body).map_err(|e| LedgerError::Malformed(e.to_string()))?;

    let mut outputs = Vec::with_capacity(tx.out.len());
    for (index, out) in tx.out.into_iter().enumerate() {
        match out.addr {
            Some(address) => outputs.push(LedgerOutput {
                address,
                value: out.value,
            }),
            None => debug!(index, value = out.value, "skipping output without address"),
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_includes_limit() {
        let client = BlockExplorerClient::new(&LedgerConfig {
            api_base: "https://ledger.example/rawtx/".to_string(),
            output_limit: 250,
            ..LedgerConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.transaction_endpoint("abc"),
            "https://ledger.example/rawtx/abc?limit=250"
        );
    }

    #[test]
    fn parses_outputs_in_order() {
        let body = r#"{
            "hash": "abc",
            "out": [
                {"addr": "1AAA", "value": 5500, "n": 0},
                {"addr": "1BBB", "value": 12000, "n": 1}
            ]
        }"#;
        let outputs = parse_outputs(body).unwrap();
        assert_eq!(
            outputs,
            vec![
                LedgerOutput { address: "1AAA".into(), value: 5500 },
                LedgerOutput { address: "1BBB".into(), value: 12000 },
            ]
        );
    }

    #[test]
    fn drops_outputs_without_address() {
        let body = r#"{"out": [{"value": 0, "script": "6a"}, {"addr": "1AAA", "value": 7}]}"#;
        let outputs = parse_outputs(body).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].address, "1AAA");
    }

    #[test]
    fn missing_outputs_are_malformed() {
        assert!(matches!(
            parse_outputs(r#"{"hash": "abc"}"#),
            Err(LedgerError::Malformed(_))
        ));
        assert!(matches!(parse_outputs("not json"), Err(LedgerError::Malformed(_))));
    }
}
