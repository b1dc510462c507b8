use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    catalog::Poll, coordinator::Coordinator, error::RelayError, message::ServerMessage, session,
    tally::PollTally,
};

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    clients: usize,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            RelayError::Invalid(_) => StatusCode::NOT_FOUND,
            RelayError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(ServerMessage::error(self.client_message()))).into_response()
    }
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/polls", get(polls_handler))
        .route("/health", get(health_handler))
        .route("/tallies", get(tallies_handler))
        .route("/ws", get(ws_handler))
        .route("/", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

async fn polls_handler(State(coordinator): State<Arc<Coordinator>>) -> Json<Vec<Poll>> {
    Json(coordinator.catalog().polls().to_vec())
}

async fn health_handler(State(coordinator): State<Arc<Coordinator>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        clients: coordinator.registry().len(),
    })
}

async fn tallies_handler(
    State(coordinator): State<Arc<Coordinator>>,
) -> Result<Json<Vec<PollTally>>, RelayError> {
    let tallies = coordinator.tallies().compute_all_tallies().await?;
    Ok(Json(tallies))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(coordinator): State<Arc<Coordinator>>,
) -> Response {
    ws.on_upgrade(move |socket| session::run_connection(socket, peer, coordinator))
}

pub struct Server {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
}

impl Server {
    pub fn new(listener: TcpListener, coordinator: Arc<Coordinator>) -> Self {
        Self {
            listener,
            coordinator,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Server {
            listener,
            coordinator,
        } = self;
        let app = router(coordinator).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("vote relay shutting down");
            })
            .await
            .context("server loop failed")
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
