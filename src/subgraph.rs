// ===============================
// src/subgraph.rs (share-token balances per block via GraphQL)
// ===============================
use std::{str::FromStr, time::Duration};

use alloy::primitives::{Address, U256};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::domain::ShareBalance;
use crate::snapshot::SnapshotError;

// Cursor pagination (id_gt) supaya tidak kena batas `skip` subgraph
const SHARE_BALANCES_QUERY: &str = r#"
query ShareBalances($block: Int!, $first: Int!, $lastId: String!) {
  vaultShareBalances(
    first: $first
    block: { number: $block }
    orderBy: id
    orderDirection: asc
    where: { id_gt: $lastId, balance_gt: "0" }
  ) {
    id
    user
    vault
    balance
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareBalancesPage {
    vault_share_balances: Vec<RawShareBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawShareBalance {
    pub id: String,
    pub user: String,
    pub vault: String,
    pub balance: String,
}

impl TryFrom<&RawShareBalance> for ShareBalance {
    type Error = SnapshotError;

    fn try_from(raw: &RawShareBalance) -> Result<Self, Self::Error> {
        let bad = |field: &str, value: &str| {
            SnapshotError::Malformed(format!("share balance {}: bad {field} '{value}'", raw.id))
        };
        let user = Address::from_str(&raw.user).map_err(|_| bad("user", &raw.user))?;
        let vault = Address::from_str(&raw.vault).map_err(|_| bad("vault", &raw.vault))?;
        let balance = U256::from_str_radix(&raw.balance, 10).map_err(|_| bad("balance", &raw.balance))?;
        Ok(ShareBalance { user, vault, balance, is_active: true })
    }
}

pub struct SubgraphClient {
    http: reqwest::Client,
    url: Url,
    page_size: usize,
}

impl SubgraphClient {
    pub fn new(url: Url, page_size: usize, timeout: Duration) -> Result<Self, SnapshotError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SnapshotError::Subgraph(format!("http client: {e}")))?;
        Ok(Self { http, url, page_size: page_size.max(1) })
    }

    pub async fn share_balances(&self, block: u64) -> Result<Vec<ShareBalance>, SnapshotError> {
        let mut out = Vec::new();
        let mut last_id = String::new();

        loop {
            let page = self.fetch_page(block, &last_id).await?;
            let n = page.len();
            for raw in &page {
                out.push(ShareBalance::try_from(raw)?);
            }
            debug!(block, n, total = out.len(), "subgraph page");

            match page.last() {
                Some(last) if n >= self.page_size => last_id = last.id.clone(),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn fetch_page(&self, block: u64, last_id: &str) -> Result<Vec<RawShareBalance>, SnapshotError> {
        let body = json!({
            "query": SHARE_BALANCES_QUERY,
            "variables": { "block": block, "first": self.page_size, "lastId": last_id },
        });

        let rsp = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| SnapshotError::Subgraph(format!("request failed: {e}")))?;

        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(SnapshotError::Subgraph(format!("http {status}: {text}")));
        }

        let parsed: GraphQlResponse<ShareBalancesPage> = rsp
            .json()
            .await
            .map_err(|e| SnapshotError::Subgraph(format!("bad response body: {e}")))?;
        into_page(parsed)
    }
}

fn into_page(rsp: GraphQlResponse<ShareBalancesPage>) -> Result<Vec<RawShareBalance>, SnapshotError> {
    if !rsp.errors.is_empty() {
        let msgs: Vec<_> = rsp.errors.into_iter().map(|e| e.message).collect();
        return Err(SnapshotError::Subgraph(msgs.join("; ")));
    }
    rsp.data
        .map(|d| d.vault_share_balances)
        .ok_or_else(|| SnapshotError::Subgraph("response has neither data nor errors".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<Vec<RawShareBalance>, SnapshotError> {
        into_page(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn page_is_decoded_into_balances() {
        let page = parse(
            r#"{"data":{"vaultShareBalances":[
                {"id":"a","user":"0xABCDEF0123456789abcdef0123456789ABCDEF01",
                 "vault":"0x1111111111111111111111111111111111111111",
                 "balance":"123456789012345678901234567890"}
            ]}}"#,
        )
        .unwrap();

        let b = ShareBalance::try_from(&page[0]).unwrap();
        assert_eq!(b.user, Address::from_str("0xabcdef0123456789abcdef0123456789abcdef01").unwrap());
        assert_eq!(b.vault, Address::repeat_byte(0x11));
        assert_eq!(b.balance, U256::from(123456789012345678901234567890u128));
        assert!(b.is_active);
    }

    #[test]
    fn graphql_errors_are_surfaced() {
        let err = parse(r#"{"data":null,"errors":[{"message":"indexing error"},{"message":"x"}]}"#)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Subgraph(m) if m == "indexing error; x"));
    }

    #[test]
    fn empty_response_is_an_error() {
        assert!(parse(r#"{}"#).is_err());
    }

    #[test]
    fn bad_balance_is_malformed() {
        let raw = RawShareBalance {
            id: "x".into(),
            user: format!("0x{}", "01".repeat(20)),
            vault: format!("0x{}", "02".repeat(20)),
            balance: "1e18".into(),
        };
        assert!(matches!(ShareBalance::try_from(&raw), Err(SnapshotError::Malformed(_))));
    }
}
