//! GM Points Server
//!
//! HTTP surface for score authorization, claim submission, reconciliation and
//! the public leaderboard.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::auth::{recover_caller, ClaimAuthorizer, PlaySession};
use crate::config::{Config, IndexerSource};
use crate::error::{AuthorizeError, ClaimError, ErrorKind};
use crate::event_source::{EventSource, LocalEventLog, RpcEventSource};
use crate::indexer::ChainIndexer;
use crate::leaderboard::{clamp_top_n, LeaderboardStore};
use crate::ledger::ClaimLedger;
use crate::storage::GmStorage;
use crate::typed_data::{encode_signature, parse_signature, parse_wallet, wallet_key, ClaimDomain, ScoreClaim};
use crate::types::WalletLedgerRecord;

/// Where claims are settled.
pub enum LedgerMode {
    /// Ledger runs in this process and writes the local claim log.
    Embedded(Arc<ClaimLedger>),
    /// Ledger is an on-chain deployment; this process only indexes it.
    Remote,
    /// Missing signing identity; carries the misconfiguration code.
    Unconfigured(&'static str),
}

pub struct AppState {
    pub authorizer: ClaimAuthorizer,
    pub ledger: LedgerMode,
    pub indexer: Arc<ChainIndexer>,
    pub storage: Arc<GmStorage>,
    pub admin_token: Option<String>,
    pub chain_id: u64,
    pub contract: Option<Address>,
    pub request_timeout: Duration,
    pub started_at: Instant,
}

/// Wire up authorizer, ledger and indexer from configuration.
pub fn build_state(
    config: &Config,
    storage: Arc<GmStorage>,
    signer: Option<PrivateKeySigner>,
    admin_token: Option<String>,
) -> anyhow::Result<AppState> {
    let contract = config.contract_address();
    let tiers = config.score_tiers()?;
    let authorizer_address = signer
        .as_ref()
        .map(|s| s.address())
        .or_else(|| config.authorizer_address());

    let ledger = match config.indexer.source {
        IndexerSource::Rpc => LedgerMode::Remote,
        IndexerSource::Local => match (contract, authorizer_address) {
            (None, _) => LedgerMode::Unconfigured("NO_CONTRACT"),
            (_, None) => LedgerMode::Unconfigured("NO_SIGNER"),
            (Some(contract), Some(authorizer)) => LedgerMode::Embedded(Arc::new(ClaimLedger::new(
                storage.clone(),
                ClaimDomain::new(config.chain.chain_id, contract),
                authorizer,
                tiers,
            ))),
        },
    };

    // The local log has a single writer and ignores the address
    let ledger_address = match config.indexer.source {
        IndexerSource::Local => contract.unwrap_or(Address::ZERO),
        IndexerSource::Rpc => {
            contract.context("indexer.source = \"rpc\" requires chain.contract_address")?
        }
    };

    let source: Arc<dyn EventSource> = match config.indexer.source {
        IndexerSource::Local => Arc::new(LocalEventLog::new(storage.clone())),
        IndexerSource::Rpc => {
            let url: alloy::transports::http::reqwest::Url = config
                .chain
                .rpc_url
                .parse()
                .context("chain.rpc_url is not a valid URL")?;
            let provider = ProviderBuilder::new().connect_http(url);
            Arc::new(RpcEventSource::new(provider, config.chain.from_block))
        }
    };

    let indexer = ChainIndexer::new(source, storage.clone(), ledger_address)
        .with_request_timeout(config.request_timeout());

    Ok(AppState {
        authorizer: ClaimAuthorizer::new(
            signer,
            contract,
            config.chain.chain_id,
            config.session_policy(),
        ),
        ledger,
        indexer: Arc::new(indexer),
        storage,
        admin_token,
        chain_id: config.chain.chain_id,
        contract,
        request_timeout: config.request_timeout(),
        started_at: Instant::now(),
    })
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/sign-score", post(sign_score_handler))
        .route("/claim", post(claim_handler))
        .route("/reindex", post(reindex_handler))
        .route(
            "/leaderboard",
            get(leaderboard_handler).post(leaderboard_upsert_handler),
        )
        .route("/points/:wallet", get(points_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::AntiAbuse => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
        ErrorKind::LedgerConflict => StatusCode::CONFLICT,
        ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Misconfiguration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": code, "message": message.into() })),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "healthy": true,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "ledger": match state.ledger {
            LedgerMode::Embedded(_) => "embedded",
            LedgerMode::Remote => "remote",
            LedgerMode::Unconfigured(_) => "unconfigured",
        },
    }))
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tiers = match &state.ledger {
        LedgerMode::Embedded(ledger) => serde_json::to_value(ledger.tiers().tiers()).ok(),
        _ => None,
    };
    Json(json!({
        "chainId": state.chain_id,
        "contractAddress": state.contract.map(|c| wallet_key(&c)),
        "authorizer": state.authorizer.authorizer_address().map(|a| wallet_key(&a)),
        "policy": state.authorizer.policy(),
        "scoreTiers": tiers,
    }))
}

// ============================================================================
// POST /sign-score - anti-abuse gate + signed score attestation
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignScoreBody {
    pub wallet: Option<String>,
    pub score: Option<u64>,
    pub moves: Option<u32>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignScoreResponse {
    pub claim: ScoreClaim,
    pub signature: String,
    pub contract_address: String,
}

fn authorize_rejection(err: AuthorizeError) -> Response {
    let status = status_for(err.kind());
    if err.kind() == ErrorKind::Misconfiguration {
        error!("Score authorization misconfigured: {}", err);
    }
    (status, err.code()).into_response()
}

pub async fn sign_score_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SignScoreBody>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return authorize_rejection(AuthorizeError::InvalidBody("unparseable JSON".into()));
    };

    let (Some(wallet), Some(score)) = (body.wallet.as_deref().and_then(parse_wallet), body.score)
    else {
        return authorize_rejection(AuthorizeError::InvalidBody(
            "wallet and numeric score are required".into(),
        ));
    };

    let session = PlaySession {
        wallet,
        score,
        move_count: body.moves.unwrap_or(0),
        session_duration_ms: body.duration_ms.unwrap_or(0),
    };

    match state.authorizer.authorize(&session) {
        Ok(signed) => Json(SignScoreResponse {
            claim: signed.claim,
            signature: encode_signature(&signed.signature),
            contract_address: wallet_key(&signed.ledger),
        })
        .into_response(),
        Err(e) => authorize_rejection(e),
    }
}

// ============================================================================
// POST /claim - settle a signed claim on the embedded ledger
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBody {
    pub claim: ScoreClaim,
    pub signature: String,
    /// EIP-191 signature by the claim wallet over the raw `signature` bytes
    pub caller_signature: String,
}

fn claim_rejection(err: ClaimError) -> Response {
    let status = match &err {
        ClaimError::WalletMismatch => StatusCode::FORBIDDEN,
        _ => status_for(err.kind()),
    };
    json_error(status, err.code(), err.to_string())
}

pub async fn claim_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ClaimBody>, JsonRejection>,
) -> Response {
    let ledger = match &state.ledger {
        LedgerMode::Embedded(ledger) => ledger.clone(),
        LedgerMode::Remote => {
            return json_error(
                StatusCode::NOT_FOUND,
                "LEDGER_REMOTE",
                "claims settle on the on-chain ledger",
            )
        }
        LedgerMode::Unconfigured(code) => return claim_rejection(ClaimError::Unconfigured(*code)),
    };

    let body = match body {
        Ok(Json(body)) => body,
        Err(e) => return claim_rejection(ClaimError::InvalidBody(e.body_text())),
    };

    let Some(signature) = parse_signature(&body.signature) else {
        return claim_rejection(ClaimError::InvalidBody("malformed signature".into()));
    };
    let Some(caller) = parse_signature(&body.caller_signature)
        .and_then(|proof| recover_caller(&signature, &proof))
    else {
        return claim_rejection(ClaimError::InvalidBody("malformed caller signature".into()));
    };

    let submitted = tokio::time::timeout(
        state.request_timeout,
        ledger.submit_claim(caller, &body.claim, &signature),
    )
    .await
    .unwrap_or(Err(ClaimError::Timeout));

    match submitted {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => {
            if e.is_retryable() {
                warn!("Claim submission failed: {}", e);
            }
            claim_rejection(e)
        }
    }
}

// ============================================================================
// POST /reindex - catch the leaderboard up with the claim log
// ============================================================================

pub async fn reindex_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.indexer.reconcile().await {
        Ok(report) => Json(json!({
            "ok": true,
            "processed": report.processed_count,
            "upTo": report.checkpoint_after,
            "processedCount": report.processed_count,
            "checkpointAfter": report.checkpoint_after,
            "coalesced": report.coalesced,
        }))
        .into_response(),
        Err(e) => {
            error!("Reindex failed: {}", e);
            json_error(status_for(e.kind()), e.code(), e.to_string())
        }
    }
}

// ============================================================================
// GET/POST /leaderboard
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Leader {
    pub user: String,
    pub points: u64,
}

pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let n = clamp_top_n(query.n);
    match state.storage.blocking(move |s| s.top_n(n)).await {
        Ok(entries) => {
            let leaders: Vec<Leader> = entries
                .into_iter()
                .map(|e| Leader {
                    user: wallet_key(&e.wallet),
                    points: e.points,
                })
                .collect();
            Json(json!({ "leaders": leaders })).into_response()
        }
        Err(e) => {
            error!("Failed to read leaderboard: {}", e);
            json_error(StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE", e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpsert {
    pub user: String,
    pub total_points: u64,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn leaderboard_upsert_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<LeaderboardUpsert>, JsonRejection>,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return json_error(StatusCode::FORBIDDEN, "ADMIN_DISABLED", "no admin token configured");
    };
    if bearer_token(&headers) != Some(expected) {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "bad admin token");
    }

    let Ok(Json(body)) = body else {
        return (StatusCode::BAD_REQUEST, "INVALID_BODY").into_response();
    };
    let Some(wallet) = parse_wallet(&body.user) else {
        return (StatusCode::BAD_REQUEST, "INVALID_BODY").into_response();
    };

    let points = body.total_points;
    match state.storage.blocking(move |s| s.upsert(&wallet, points)).await {
        Ok(()) => {
            info!(
                "Admin set leaderboard points for {} to {}",
                wallet_key(&wallet),
                body.total_points
            );
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => json_error(StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE", e.to_string()),
    }
}

// ============================================================================
// GET /points/:wallet - ledger record for one wallet
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    #[serde(flatten)]
    pub record: WalletLedgerRecord,
    pub leaderboard_points: Option<u64>,
}

pub async fn points_handler(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Response {
    let Some(wallet) = parse_wallet(&wallet) else {
        return json_error(StatusCode::BAD_REQUEST, "INVALID_WALLET", "not an address");
    };

    let record = state
        .storage
        .blocking(move |s| Ok((s.wallet_record(&wallet)?, s.leader_points(&wallet)?)))
        .await;

    match record {
        Ok((record, leaderboard_points)) => Json(PointsResponse {
            record: record.unwrap_or_else(|| WalletLedgerRecord::unseen(wallet)),
            leaderboard_points,
        })
        .into_response(),
        Err(e) => json_error(StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE", e.to_string()),
    }
}

/// Run the server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting GM Points server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign_caller_proof;
    use crate::config::Config;
    use axum::body::to_bytes;
    use axum::http::HeaderValue;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000c0";

    fn test_state(signer: Option<PrivateKeySigner>, admin: Option<&str>) -> Arc<AppState> {
        let mut config = Config::default();
        config.chain.contract_address = CONTRACT.to_string();
        let storage = Arc::new(GmStorage::in_memory().unwrap());
        Arc::new(build_state(&config, storage, signer, admin.map(str::to_string)).unwrap())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn sign_body(wallet: &Address, moves: u32, duration_ms: u64) -> SignScoreBody {
        SignScoreBody {
            wallet: Some(wallet_key(wallet)),
            score: Some(16_000),
            moves: Some(moves),
            duration_ms: Some(duration_ms),
        }
    }

    #[tokio::test]
    async fn test_sign_score_rejections() {
        let state = test_state(Some(PrivateKeySigner::random()), None);
        let wallet = Address::repeat_byte(0xaa);

        let resp = sign_score_handler(State(state.clone()), Ok(Json(sign_body(&wallet, 9, 20_000)))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "PLAY_MORE");

        let missing = SignScoreBody {
            wallet: None,
            score: Some(1),
            moves: Some(50),
            duration_ms: Some(60_000),
        };
        let resp = sign_score_handler(State(state.clone()), Ok(Json(missing))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "INVALID_BODY");

        let unsigned = test_state(None, None);
        let resp = sign_score_handler(State(unsigned), Ok(Json(sign_body(&wallet, 10, 15_000)))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, "NO_SIGNER");
    }

    #[tokio::test]
    async fn test_sign_claim_reindex_flow() {
        let player = PrivateKeySigner::random();
        let state = test_state(Some(PrivateKeySigner::random()), None);

        let resp = sign_score_handler(
            State(state.clone()),
            Ok(Json(sign_body(&player.address(), 10, 15_000))),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let signed = body_json(resp).await;
        assert_eq!(signed["contractAddress"], CONTRACT);

        let claim: ScoreClaim = serde_json::from_value(signed["claim"].clone()).unwrap();
        let signature = signed["signature"].as_str().unwrap().to_string();
        let proof = sign_caller_proof(&player, &parse_signature(&signature).unwrap()).unwrap();

        let body = ClaimBody {
            claim,
            signature: signature.clone(),
            caller_signature: encode_signature(&proof),
        };
        let resp = claim_handler(State(state.clone()), Ok(Json(body))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let receipt = body_json(resp).await;
        assert_eq!(receipt["pointsAdded"], 3);
        assert_eq!(receipt["newTotal"], 3);

        // Same attestation again: ledger conflict
        let again = ClaimBody {
            claim,
            signature,
            caller_signature: encode_signature(&proof),
        };
        let resp = claim_handler(State(state.clone()), Ok(Json(again))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["error"], "TOO_MANY_CLAIMS_TODAY");

        let resp = reindex_handler(State(state.clone())).await;
        let report = body_json(resp).await;
        assert_eq!(report["processed"], 1);
        assert_eq!(report["upTo"], 1);

        let resp = leaderboard_handler(State(state.clone()), Query(LeaderboardQuery { n: None })).await;
        let board = body_json(resp).await;
        assert_eq!(board["leaders"][0]["user"], wallet_key(&player.address()));
        assert_eq!(board["leaders"][0]["points"], 3);

        let resp = points_handler(State(state), Path(wallet_key(&player.address()))).await;
        let points = body_json(resp).await;
        assert_eq!(points["totalPoints"], 3);
        assert_eq!(points["currentStreak"], 1);
        assert_eq!(points["leaderboardPoints"], 3);
    }

    #[tokio::test]
    async fn test_claim_by_other_wallet_is_forbidden() {
        let player = PrivateKeySigner::random();
        let thief = PrivateKeySigner::random();
        let state = test_state(Some(PrivateKeySigner::random()), None);

        let signed = state
            .authorizer
            .authorize(&PlaySession {
                wallet: player.address(),
                score: 100,
                move_count: 10,
                session_duration_ms: 15_000,
            })
            .unwrap();
        let proof = sign_caller_proof(&thief, &signed.signature).unwrap();

        let body = ClaimBody {
            claim: signed.claim,
            signature: encode_signature(&signed.signature),
            caller_signature: encode_signature(&proof),
        };
        let resp = claim_handler(State(state), Ok(Json(body))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await["error"], "WALLET_MISMATCH");
    }

    #[tokio::test]
    async fn test_claim_without_signer_is_misconfigured() {
        let state = test_state(None, None);
        let body = ClaimBody {
            claim: ScoreClaim {
                wallet: Address::repeat_byte(1),
                score: 1,
                valid_until: 0,
                day: 0,
            },
            signature: String::new(),
            caller_signature: String::new(),
        };
        let resp = claim_handler(State(state), Ok(Json(body))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "NO_SIGNER");
    }

    #[tokio::test]
    async fn test_admin_upsert_requires_token() {
        let state = test_state(None, Some("s3cret"));
        let upsert = || LeaderboardUpsert {
            user: "0x00000000000000000000000000000000000000AA".to_string(),
            total_points: 42,
        };

        let resp = leaderboard_upsert_handler(State(state.clone()), HeaderMap::new(), Ok(Json(upsert()))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        let resp = leaderboard_upsert_handler(State(state.clone()), headers, Ok(Json(upsert()))).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = leaderboard_handler(State(state), Query(LeaderboardQuery { n: Some(5) })).await;
        let board = body_json(resp).await;
        assert_eq!(
            board["leaders"][0]["user"],
            "0x00000000000000000000000000000000000000aa"
        );
        assert_eq!(board["leaders"][0]["points"], 42);
    }

    #[test]
    fn test_rpc_mode_requires_ledger_address() {
        let mut config = Config::default();
        config.indexer.source = IndexerSource::Rpc;
        config.chain.rpc_url = "http://localhost:8545".to_string();
        let storage = Arc::new(GmStorage::in_memory().unwrap());

        let err = build_state(&config, storage.clone(), None, None)
            .err()
            .expect("rpc mode without a ledger address must not start");
        assert!(err.to_string().contains("contract_address"));

        config.chain.contract_address = CONTRACT.to_string();
        let state = build_state(&config, storage, None, None).unwrap();
        assert!(matches!(state.ledger, LedgerMode::Remote));
    }

    #[tokio::test]
    async fn test_admin_upsert_disabled_without_token() {
        let state = test_state(None, None);
        let body = LeaderboardUpsert {
            user: wallet_key(&Address::repeat_byte(1)),
            total_points: 1,
        };
        let resp = leaderboard_upsert_handler(State(state), HeaderMap::new(), Ok(Json(body))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
