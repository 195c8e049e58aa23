//! Party Service
//!
//! HTTP service hosting one party of a blind game. Every protocol
//! operation is served on its own route; audit milestones are kept in
//! memory and listed on `/v1/audit`.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, ValueEnum};
use mafia_core::action::{Abstain, FixedTarget, RandomSurvivor};
use mafia_core::{
    DecisionSource, Error, PartyNode, PartySession, PeerRequest, PeerResponse, ProtocolConfig,
};
use peer_client::HttpTransport;
use peer_relay::{routes, status_for, AuditStore, ErrorBody, StoredEvent};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, Level};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    /// Never pick a target
    Abstain,
    /// Pick a random survivor other than self
    Random,
}

/// Party service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "peer-svc")]
#[command(about = "Party node for blind hidden-role games")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// This party's index in join order
    #[arg(short, long, env = "PARTY_INDEX")]
    index: usize,

    /// Base URL of every party in join order, this one included
    #[arg(short, long, env = "PEERS", value_delimiter = ',', required = true)]
    peers: Vec<String>,

    /// Game identifier
    #[arg(short, long, env = "GAME_ID")]
    game_id: String,

    /// Protocol timing file (JSON), defaults apply to missing fields
    #[arg(long, env = "PROTOCOL_CONFIG")]
    config: Option<PathBuf>,

    /// How this party picks targets
    #[arg(long, env = "STRATEGY", value_enum, default_value = "abstain")]
    strategy: Strategy,

    /// Always pick this party, overrides --strategy
    #[arg(long, env = "FIXED_TARGET")]
    fixed_target: Option<usize>,

    /// Audit event TTL in seconds
    #[arg(long, default_value = "3600")]
    audit_ttl: i64,
}

/// Application state
struct AppState {
    node: Arc<PartyNode>,
    audit: AuditStore,
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    party: Option<usize>,
}

/// Protocol error rendered as a JSON [`ErrorBody`]
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_error(&self.0);
        let status =
            StatusCode::from_u16(status_for(body.kind)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ProtocolConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&json)?
        }
        None => ProtocolConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn decisions(args: &Args) -> Arc<dyn DecisionSource> {
    match (args.fixed_target, args.strategy) {
        (Some(target), _) => Arc::new(FixedTarget(target)),
        (None, Strategy::Random) => Arc::new(RandomSurvivor),
        (None, Strategy::Abstain) => Arc::new(Abstain),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    info!(
        listen = %args.listen,
        party = args.index,
        n_parties = args.peers.len(),
        game_id = %args.game_id,
        "Starting party service"
    );

    let session = PartySession::new(args.game_id.clone(), args.index, args.peers.len())?;
    let transport = Arc::new(HttpTransport::new(args.peers.clone()));
    let audit = AuditStore::new(args.audit_ttl);
    let node = PartyNode::new(session, transport, config)
        .with_decisions(decisions(&args))
        .with_audit(Arc::new(audit.clone()));

    let state = Arc::new(AppState {
        node: Arc::new(node),
        audit,
    });

    // Spawn cleanup task
    let cleanup_store = state.audit.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_store.cleanup();
        }
    });

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(address = %args.listen, "Listening");

    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(routes::HEALTH, get(health))
        .route(routes::AUDIT, get(audit_events))
        .route(routes::PEER, post(peer_op))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "peer-svc",
        "version": env!("CARGO_PKG_VERSION"),
        "party": state.node.index(),
        "game_id": state.node.game_id(),
    }))
}

/// Audit milestones of this party's game
async fn audit_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<StoredEvent>> {
    Json(state.audit.events(state.node.game_id(), query.party))
}

/// Serve one protocol operation
async fn peer_op(
    State(state): State<Arc<AppState>>,
    Path(op): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> std::result::Result<Json<PeerResponse>, ApiError> {
    let request = PeerRequest::from_parts(&op, body)?;
    match state.node.handle(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            debug!(op = %op, error = %e, "Request rejected");
            Err(e.into())
        }
    }
}
