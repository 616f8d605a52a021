use crate::{
    ids::{
        CoinType,
        ObjectId,
        StructTag,
        SuiAddress,
    },
    schema::{
        CoinObject,
        CoinPage,
        ExecutionResponse,
        ObjectResponse,
        OwnedObjectsPage,
        Owner,
        PoolState,
        TransactionBytes,
    },
    transactions::MoveCall,
};
use base64::{
    Engine,
    engine::general_purpose::STANDARD as BASE64,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::{
    Value,
    json,
};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};

const PAGE_LIMIT: u64 = 50;

/// Unsigned transaction as returned by the node's builder endpoints.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxBytes(String);

impl TxBytes {
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.0)
            .wrap_err("transaction bytes are not valid base64")
    }
}

/// Everything the controller needs from a Sui node.
pub trait GameChain: Clone + Send + Sync + 'static {
    fn coins(
        &self,
        owner: SuiAddress,
        coin_type: &CoinType,
    ) -> impl Future<Output = Result<Vec<CoinObject>>> + Send;

    fn game_pool(&self, game: ObjectId) -> impl Future<Output = Result<PoolState>> + Send;

    fn object_owner(&self, id: ObjectId) -> impl Future<Output = Result<Owner>> + Send;

    fn owned_objects_of_type(
        &self,
        owner: SuiAddress,
        struct_type: &StructTag,
    ) -> impl Future<Output = Result<Vec<ObjectId>>> + Send;

    fn build_move_call(
        &self,
        signer: SuiAddress,
        call: &MoveCall,
        gas_budget: u64,
    ) -> impl Future<Output = Result<TxBytes>> + Send;

    /// Splits `amount` out of `inputs` into a new coin owned by `recipient`.
    fn build_pay(
        &self,
        signer: SuiAddress,
        inputs: &[ObjectId],
        recipient: SuiAddress,
        amount: u64,
        gas_budget: u64,
    ) -> impl Future<Output = Result<TxBytes>> + Send;

    fn execute(
        &self,
        tx: &TxBytes,
        signature: &str,
    ) -> impl Future<Output = Result<ExecutionResponse>> + Send;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Clone)]
pub struct SuiRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl SuiRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for Sui RPC")?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::debug!(method, "sui rpc request");
        let res = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .wrap_err_with(|| format!("{method} request to {} failed", self.url))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .wrap_err("failed to read Sui RPC response body")?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(eyre!("{method}: node is rate limiting requests"));
        }
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(eyre!("{method}: node responded with {status}: {body}"));
        }
        let envelope: RpcResponse<T> = serde_json::from_slice(&bytes)
            .wrap_err_with(|| format!("invalid {method} response payload"))?;
        match (envelope.result, envelope.error) {
            (_, Some(err)) => Err(eyre!("{method} failed ({}): {}", err.code, err.message)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(eyre!("{method} returned neither result nor error")),
        }
    }

    async fn get_object(&self, id: ObjectId, options: Value) -> Result<ObjectResponse> {
        self.call("sui_getObject", json!([id, options])).await
    }

    /// Full `sui_getObject` data for `id`, undecoded.
    pub async fn raw_object(&self, id: ObjectId) -> Result<Value> {
        let response: Value = self
            .call("sui_getObject", json!([id, inspect_options()]))
            .await?;
        object_data(id, response)
    }
}

fn inspect_options() -> Value {
    json!({
        "showType": true,
        "showOwner": true,
        "showContent": true,
        "showPreviousTransaction": true,
    })
}

fn object_data(id: ObjectId, mut response: Value) -> Result<Value> {
    if let Some(err) = response.get("error") {
        return Err(eyre!("object {id} unavailable: {err}"));
    }
    match response.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(eyre!("node returned no data for object {id}")),
    }
}

impl GameChain for SuiRpcClient {
    async fn coins(&self, owner: SuiAddress, coin_type: &CoinType) -> Result<Vec<CoinObject>> {
        let mut coins = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: CoinPage = self
                .call(
                    "suix_getCoins",
                    json!([owner, coin_type.to_string(), cursor, PAGE_LIMIT]),
                )
                .await?;
            coins.extend(page.data);
            if !page.has_next_page || page.next_cursor.is_none() {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(coins)
    }

    async fn game_pool(&self, game: ObjectId) -> Result<PoolState> {
        let data = self
            .get_object(game, json!({ "showContent": true, "showType": true }))
            .await?
            .into_data(game)?;
        Ok(data.decode_game_pool()?)
    }

    async fn object_owner(&self, id: ObjectId) -> Result<Owner> {
        self.get_object(id, json!({ "showOwner": true }))
            .await?
            .into_data(id)?
            .owner
            .ok_or_else(|| eyre!("node did not report an owner for {id}"))
    }

    async fn owned_objects_of_type(
        &self,
        owner: SuiAddress,
        struct_type: &StructTag,
    ) -> Result<Vec<ObjectId>> {
        let query = json!({
            "filter": { "StructType": struct_type.to_string() },
            "options": { "showType": true },
        });
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: OwnedObjectsPage = self
                .call(
                    "suix_getOwnedObjects",
                    json!([owner, query, cursor, PAGE_LIMIT]),
                )
                .await?;
            ids.extend(
                page.data
                    .into_iter()
                    .filter_map(|object| object.data)
                    .filter(|data| {
                        data.object_type
                            .as_deref()
                            .and_then(|t| t.parse::<StructTag>().ok())
                            .is_some_and(|t| &t == struct_type)
                    })
                    .map(|data| data.object_id),
            );
            if !page.has_next_page || page.next_cursor.is_none() {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(ids)
    }

    async fn build_move_call(
        &self,
        signer: SuiAddress,
        call: &MoveCall,
        gas_budget: u64,
    ) -> Result<TxBytes> {
        let built: TransactionBytes = self
            .call(
                "unsafe_moveCall",
                json!([
                    signer,
                    call.package,
                    call.module,
                    call.function,
                    call.type_arguments_json(),
                    call.arguments_json(),
                    Value::Null,
                    gas_budget.to_string(),
                ]),
            )
            .await
            .wrap_err_with(|| format!("building {} failed", call.target()))?;
        Ok(TxBytes::from_base64(built.tx_bytes))
    }

    async fn build_pay(
        &self,
        signer: SuiAddress,
        inputs: &[ObjectId],
        recipient: SuiAddress,
        amount: u64,
        gas_budget: u64,
    ) -> Result<TxBytes> {
        let built: TransactionBytes = self
            .call(
                "unsafe_pay",
                json!([
                    signer,
                    inputs,
                    [recipient],
                    [amount.to_string()],
                    Value::Null,
                    gas_budget.to_string(),
                ]),
            )
            .await
            .wrap_err("building stake coin split failed")?;
        Ok(TxBytes::from_base64(built.tx_bytes))
    }

    async fn execute(&self, tx: &TxBytes, signature: &str) -> Result<ExecutionResponse> {
        self.call(
            "sui_executeTransactionBlock",
            json!([
                tx.as_base64(),
                [signature],
                {
                    "showEffects": true,
                    "showBalanceChanges": true,
                    "showObjectChanges": true,
                },
                "WaitForLocalExecution",
            ]),
        )
        .await
    }
}
