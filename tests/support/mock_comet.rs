use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use blockcrawler::chain::decode::{tx_hash, Any, AuthInfo, PubKey, SignerInfo, TxBody, TxRaw};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use prost::Message;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const PROPOSER_HEX: &str = "0102030405060708090A0B0C0D0E0F1011121314";

/// One block and its transactions, as a CometBFT node would serve them.
pub struct CometFixture {
    pub height: i64,
    pub raw_txs: Vec<Vec<u8>>,
    pub genesis_chunks: Vec<String>,
    /// Leading `status` requests answered with HTTP 503.
    pub failing_status_requests: usize,
}

impl CometFixture {
    pub fn new(height: i64, memos: &[&str]) -> Self {
        Self {
            height,
            raw_txs: memos.iter().map(|memo| signed_tx(memo)).collect(),
            genesis_chunks: Vec::new(),
            failing_status_requests: 0,
        }
    }

    pub fn with_genesis(mut self, document: &str, chunks: usize) -> Self {
        let bytes = document.as_bytes();
        let size = bytes.len().div_ceil(chunks.max(1)).max(1);
        self.genesis_chunks = bytes.chunks(size).map(|part| STANDARD.encode(part)).collect();
        self
    }

    pub fn with_failing_status_requests(mut self, count: usize) -> Self {
        self.failing_status_requests = count;
        self
    }

    pub fn tx_hashes(&self) -> Vec<String> {
        self.raw_txs.iter().map(|raw| tx_hash(raw)).collect()
    }
}

/// Transaction with one bank message and a secp256k1 signer.
pub fn signed_tx(memo: &str) -> Vec<u8> {
    let body = TxBody {
        messages: vec![Any {
            type_url: "/cosmos.bank.v1beta1.MsgSend".into(),
            value: memo.as_bytes().to_vec(),
        }],
        memo: memo.to_string(),
        timeout_height: 0,
    };
    let auth_info = AuthInfo {
        signer_infos: vec![SignerInfo {
            public_key: Some(Any {
                type_url: "/cosmos.crypto.secp256k1.PubKey".into(),
                value: PubKey { key: vec![2; 33] }.encode_to_vec(),
            }),
            sequence: 1,
        }],
    };
    TxRaw {
        body_bytes: body.encode_to_vec(),
        auth_info_bytes: auth_info.encode_to_vec(),
        signatures: vec![vec![7; 64]],
    }
    .encode_to_vec()
}

struct CometState {
    fixture: CometFixture,
    status_failures_left: AtomicUsize,
    requests: AtomicUsize,
}

pub struct MockCometServer {
    url: String,
    state: Arc<CometState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockCometServer {
    pub async fn start(fixture: CometFixture) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock node listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let state = Arc::new(CometState {
            status_failures_left: AtomicUsize::new(fixture.failing_status_requests),
            fixture,
            requests: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let service_state = state.clone();
        let make_service = make_service_fn(move |_| {
            let state = service_state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(state.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock node stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{addr}"),
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    state: Arc<CometState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if req.method() != Method::POST {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => return Ok(plain(StatusCode::BAD_REQUEST, format!("failed to read body: {err}"))),
    };
    let call: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => return Ok(plain(StatusCode::BAD_REQUEST, format!("invalid JSON payload: {err}"))),
    };

    let method = call.get("method").and_then(Value::as_str).unwrap_or_default();
    if method == "status" {
        let failing = state
            .status_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Ok(plain(StatusCode::SERVICE_UNAVAILABLE, "node is starting"));
        }
    }

    let response = handle_call(&state.fixture, call);
    let mut response = Response::new(Body::from(response.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(fixture: &CometFixture, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call.get("params").cloned().unwrap_or(Value::Null);
    let param = |name: &str| -> Option<i64> {
        params
            .get(name)
            .and_then(|value| value.as_str().map(str::to_string).or_else(|| Some(value.to_string())))
            .and_then(|value| value.parse().ok())
    };

    match method.as_str() {
        "status" => success(
            id,
            json!({"sync_info": {"latest_block_height": fixture.height.to_string(), "catching_up": false}}),
        ),
        "block" => match param("height") {
            Some(height) if height == fixture.height => success(id, block_json(fixture)),
            Some(height) => error(
                id,
                -32603,
                "Internal error",
                format!(
                    "height {height} must be less than or equal to the current blockchain height {}",
                    fixture.height
                ),
            ),
            None => error(id, -32602, "Invalid params", "missing height".into()),
        },
        "tx_search" => {
            let page = param("page").unwrap_or(1).max(1) as usize;
            let per_page = param("per_page").unwrap_or(30).max(1) as usize;
            success(id, tx_search_json(fixture, page, per_page))
        }
        "genesis_chunked" => {
            let index = param("chunk").unwrap_or(0) as usize;
            match fixture.genesis_chunks.get(index) {
                Some(data) => success(
                    id,
                    json!({
                        "chunk": index.to_string(),
                        "total": fixture.genesis_chunks.len().to_string(),
                        "data": data,
                    }),
                ),
                None => error(id, -32603, "Internal error", format!("chunk {index} is invalid")),
            }
        }
        _ => error(id, -32601, "Method not found", method),
    }
}

fn block_json(fixture: &CometFixture) -> Value {
    let txs: Vec<String> = fixture.raw_txs.iter().map(|raw| STANDARD.encode(raw)).collect();
    json!({
        "block_id": {"hash": "6E0D6E9F1B0C34A2B5F1B0C3D4E5F60718293A4B5C6D7E8F90A1B2C3D4E5F607"},
        "block": {
            "header": {
                "height": fixture.height.to_string(),
                "time": "2024-03-01T12:00:00.123456789Z",
                "proposer_address": PROPOSER_HEX,
            },
            "data": {"txs": txs},
            "evidence": {"evidence": []},
            "last_commit": {
                "signatures": [
                    {
                        "block_id_flag": 2,
                        "validator_address": PROPOSER_HEX,
                        "timestamp": "2024-03-01T11:59:59Z",
                        "signature": "c2lnbmF0dXJl",
                    },
                    {
                        "block_id_flag": 1,
                        "validator_address": "",
                        "timestamp": "0001-01-01T00:00:00Z",
                        "signature": null,
                    },
                ],
            },
        },
    })
}

/// Pages are served newest-first so callers cannot rely on node order.
fn tx_search_json(fixture: &CometFixture, page: usize, per_page: usize) -> Value {
    let entries: Vec<Value> = fixture
        .raw_txs
        .iter()
        .rev()
        .map(|raw| {
            json!({
                "hash": tx_hash(raw),
                "height": fixture.height.to_string(),
                "tx_result": {
                    "code": 0,
                    "codespace": "",
                    "log": "[{\"msg_index\":0,\"events\":[{\"type\":\"transfer\",\"attributes\":[{\"key\":\"amount\",\"value\":\"5stake\"}]}]}]",
                    "gas_wanted": "200000",
                    "gas_used": "51000",
                },
                "tx": STANDARD.encode(raw),
            })
        })
        .collect();

    let page_entries: Vec<Value> = entries
        .iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect();

    json!({"txs": page_entries, "total_count": entries.len().to_string()})
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: &str, data: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message,
            "data": data,
        },
        "id": id,
    })
}

fn plain(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}
