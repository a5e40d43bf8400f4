//! JSON-RPC client for syscoind.

use super::traits::*;
use crate::governance::{Amount, ObjectHash, VoteOutcome, VoteSignal};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// `getblockhash` error code for heights past the tip.
const RPC_INVALID_PARAMETER: i32 = -8;

/// Connection settings for the daemon's RPC port.
#[derive(Debug, Clone)]
pub struct RpcCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

impl RpcCredentials {
    fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    /// HTTP basic-auth `Authorization` value. Credentials stay out of the URL.
    fn authorization(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {}", token)
    }
}

impl From<ClientError> for DaemonError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Call(obj) => DaemonError::Rpc {
                code: obj.code(),
                message: obj.message().to_string(),
            },
            ClientError::ParseError(e) => DaemonError::Decode(e.to_string()),
            other => DaemonError::Transport(other.to_string()),
        }
    }
}

/// syscoind over HTTP JSON-RPC with basic auth.
pub struct JsonRpcDaemon {
    client: HttpClient,
}

impl JsonRpcDaemon {
    pub fn connect(creds: &RpcCredentials) -> DaemonResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&creds.authorization())
            .map_err(|e| DaemonError::Transport(format!("authorization header: {}", e)))?;
        headers.insert("authorization", auth);
        let client = HttpClientBuilder::default()
            .request_timeout(creds.timeout)
            .set_headers(headers)
            .build(creds.url())?;
        Ok(Self { client })
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: ArrayParams) -> DaemonResult<R> {
        debug!(method, "rpc call");
        Ok(self.client.request(method, params).await?)
    }
}

fn field<'a>(value: &'a Value, key: &str) -> DaemonResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| DaemonError::Decode(format!("missing field '{}'", key)))
}

/// Parse one `gobject_getcurrentvotes` entry: `outpoint:time:outcome:signal`.
fn parse_current_vote(line: &str) -> Option<NetworkVote> {
    let mut parts = line.rsplitn(4, ':');
    let signal = parts.next()?.parse().ok()?;
    let outcome = parts.next()?.parse().ok()?;
    let time = parts.next()?.parse().ok()?;
    Some(NetworkVote {
        signal,
        outcome,
        time,
    })
}

/// Interpret `gobject_vote_conf` output.
fn parse_vote_receipt(output: &Value) -> VoteReceipt {
    let details = output.get("detail").and_then(Value::as_object);
    let mut error = None;
    if let Some(details) = details {
        for entry in details.values() {
            if entry.get("result").and_then(Value::as_str) == Some("success") {
                return VoteReceipt::accepted();
            }
            if error.is_none() {
                error = entry
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
    }
    VoteReceipt {
        success: false,
        error: error.or_else(|| {
            output
                .get("overall")
                .and_then(Value::as_str)
                .map(str::to_string)
        }),
    }
}

#[async_trait]
impl ChainDaemon for JsonRpcDaemon {
    async fn governance_info(&self) -> DaemonResult<GovernanceInfo> {
        self.call("getgovernanceinfo", rpc_params![]).await
    }

    async fn is_synced(&self) -> DaemonResult<bool> {
        let status: Value = self.call("mnsync", rpc_params!["status"]).await?;
        Ok(field(&status, "IsSynced")?.as_bool().unwrap_or(false))
    }

    async fn masternode_status(&self) -> DaemonResult<Option<MasternodeStatus>> {
        let status: Value = match self.call("masternode_status", rpc_params![]).await {
            Ok(v) => v,
            // Not configured as a masternode.
            Err(DaemonError::Rpc { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let outpoint = match status.get("outpoint").and_then(Value::as_str) {
            Some(o) if !o.is_empty() => o.to_string(),
            _ => return Ok(None),
        };
        let state = status
            .get("state")
            .or_else(|| status.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Some(MasternodeStatus { outpoint, state }))
    }

    async fn block_count(&self) -> DaemonResult<u64> {
        self.call("getblockcount", rpc_params![]).await
    }

    async fn block_time(&self, height: u64) -> DaemonResult<Option<i64>> {
        let hash: String = match self.call("getblockhash", rpc_params![height]).await {
            Ok(h) => h,
            Err(DaemonError::Rpc { code, .. }) if code == RPC_INVALID_PARAMETER => return Ok(None),
            Err(e) => return Err(e),
        };
        let block: Value = self.call("getblock", rpc_params![hash]).await?;
        field(&block, "time")?
            .as_i64()
            .map(Some)
            .ok_or_else(|| DaemonError::Decode("block time is not an integer".to_string()))
    }

    async fn best_block_hash(&self) -> DaemonResult<String> {
        self.call("getbestblockhash", rpc_params![]).await
    }

    async fn best_chainlock(&self) -> DaemonResult<ChainLock> {
        let lock: Value = self.call("getbestchainlock", rpc_params![]).await?;
        let block_hash = field(&lock, "blockhash")?
            .as_str()
            .ok_or_else(|| DaemonError::Decode("chainlock blockhash".to_string()))?
            .to_string();
        let height = field(&lock, "height")?
            .as_u64()
            .ok_or_else(|| DaemonError::Decode("chainlock height".to_string()))?;
        Ok(ChainLock { block_hash, height })
    }

    async fn masternode_list(&self) -> DaemonResult<Vec<MasternodeEntry>> {
        let list: HashMap<String, Value> = self.call("masternode_list", rpc_params!["json"]).await?;
        let mut entries: Vec<MasternodeEntry> = list
            .into_iter()
            .map(|(key, info)| MasternodeEntry {
                outpoint: info
                    .get("outpoint")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(key),
                status: info
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();
        entries.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        Ok(entries)
    }

    async fn enabled_masternode_count(&self) -> DaemonResult<u64> {
        let count: Value = self.call("masternode_count", rpc_params![]).await?;
        match &count {
            Value::Number(n) => n.as_u64(),
            other => other.get("enabled").and_then(Value::as_u64),
        }
        .ok_or_else(|| DaemonError::Decode(format!("masternode_count: {}", count)))
    }

    async fn superblock_budget(&self, height: u64) -> DaemonResult<Amount> {
        let budget: Value = self.call("getsuperblockbudget", rpc_params![height]).await?;
        Amount::from_json(&budget).map_err(|e| DaemonError::Decode(e.to_string()))
    }

    async fn governance_objects(&self) -> DaemonResult<Vec<RawGovernanceObject>> {
        let list: HashMap<String, RawGovernanceObject> =
            self.call("gobject_list", rpc_params![]).await?;
        Ok(list.into_values().collect())
    }

    async fn vote(
        &self,
        object_hash: &ObjectHash,
        signal: VoteSignal,
        outcome: VoteOutcome,
    ) -> DaemonResult<VoteReceipt> {
        let output: Value = self
            .call(
                "gobject_vote_conf",
                rpc_params![object_hash.as_str(), signal.as_str(), outcome.as_str()],
            )
            .await?;
        Ok(parse_vote_receipt(&output))
    }

    async fn current_votes(
        &self,
        object_hash: &ObjectHash,
        outpoint: &str,
    ) -> DaemonResult<Vec<NetworkVote>> {
        let (txid, vout) = outpoint
            .rsplit_once('-')
            .ok_or_else(|| DaemonError::Decode(format!("bad outpoint '{}'", outpoint)))?;
        let votes: HashMap<String, String> = self
            .call(
                "gobject_getcurrentvotes",
                rpc_params![object_hash.as_str(), txid, vout],
            )
            .await?;
        Ok(votes.values().filter_map(|v| parse_current_vote(v)).collect())
    }

    async fn submit_superblock(&self, epoch: i64, data_hex: &str) -> DaemonResult<ObjectHash> {
        let hash: String = self
            .call("gobject_submit", rpc_params!["0", 1, epoch, data_hex])
            .await?;
        ObjectHash::parse(&hash).map_err(|e| DaemonError::Decode(e.to_string()))
    }
}
