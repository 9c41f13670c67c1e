use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, ws},
    routing::get,
};
use chatproto::conn::ConnId;
use chatproto::event::{ClientEvent, ServerEvent, parse_client};
use chatproto::persona::{Catalog, Mode};
use doubtroom::fanout::{OUTBOUND_QUEUE, deliver};
use doubtroom::responder::ResponderConfig;
use doubtroom::{ConnState, Outbound, Room, RoomConfig, StatusReport};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

fn usage_and_exit() -> ! {
    eprintln!(
        "doubt_server\n\n\
USAGE:\n  doubt_server [--bind HOST:PORT] [--mode classic|ai] [--dir PATH] [--ai-url URL] [--ai-model NAME]\n               [--ai-prob P] [--ai-timeout-ms MS] [--history N]\n\n\
ENV:\n  BIND            default 0.0.0.0:8000\n  DOUBT_MODE      default ai (classic: 5 human seats; ai: 3 human seats + 2 ai personas)\n  STATIC_DIR      optional; served at / when set\n  AI_BASE_URL     default http://127.0.0.1:11434 (POST {{url}}/api/chat)\n  AI_MODEL        default llama3\n  AI_PROBABILITY  default 0.8 (chance a human message triggers an ai reply)\n  AI_TIMEOUT_MS   default 10000\n  HISTORY_CAP     default 20\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    mode: Mode,
    static_dir: Option<PathBuf>,
    ai_url: String,
    ai_model: String,
    ai_probability: f64,
    ai_timeout: Duration,
    history_cap: usize,
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("BIND")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut mode: Mode = std::env::var("DOUBT_MODE")
        .unwrap_or_else(|_| "ai".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut static_dir: Option<PathBuf> = std::env::var("STATIC_DIR").ok().map(Into::into);

    let mut ai_url =
        std::env::var("AI_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    let mut ai_model = std::env::var("AI_MODEL").unwrap_or_else(|_| "llama3".to_string());
    let mut ai_probability: f64 = std::env::var("AI_PROBABILITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(doubtroom::responder::DEFAULT_PROBABILITY);
    let mut ai_timeout_ms: u64 = std::env::var("AI_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000);
    let mut history_cap: usize = std::env::var("HISTORY_CAP")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(doubtroom::history::DEFAULT_HISTORY_CAP);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--mode" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                mode = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--dir" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                static_dir = Some(v.into());
            }
            "--ai-url" => ai_url = it.next().unwrap_or_else(|| usage_and_exit()),
            "--ai-model" => ai_model = it.next().unwrap_or_else(|| usage_and_exit()),
            "--ai-prob" => {
                ai_probability = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "--ai-timeout-ms" => {
                ai_timeout_ms = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "--history" => {
                history_cap = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    if !(0.0..=1.0).contains(&ai_probability) {
        usage_and_exit();
    }

    Config {
        bind,
        mode,
        static_dir,
        ai_url,
        ai_model,
        ai_probability,
        ai_timeout: Duration::from_millis(ai_timeout_ms.max(1)),
        history_cap: history_cap.max(1),
    }
}

#[derive(Clone)]
struct AppState {
    room: Room,
}

async fn ws_session(
    ws: ws::WebSocketUpgrade,
    State(state): State<AppState>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| async move { ws_session_task(socket, state.room).await })
}

async fn api_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.room.status().await)
}

async fn ws_session_task(socket: ws::WebSocket, room: Room) {
    let conn = ConnId::random();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);

    // Writer task.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let res = match msg {
                Outbound::JsonText(s) => sink.send(ws::Message::Text(s)).await,
                Outbound::Close => {
                    let _ = sink.send(ws::Message::Close(None)).await;
                    break;
                }
            };
            if res.is_err() {
                break;
            }
        }
    });

    let mut state = ConnState::Unassigned;
    match room.connect(conn, tx.clone()).await {
        Ok(persona) => state = ConnState::Active(persona),
        Err(e) => info!(conn=%conn, err=%e, "connection rejected"),
    }

    if let Some(persona) = state.persona().cloned() {
        while let Some(m) = stream.next().await {
            let m = match m {
                Ok(m) => m,
                Err(_) => break,
            };
            match m {
                ws::Message::Text(s) => match parse_client(&s) {
                    Ok(ClientEvent::ChatMessage { message, timestamp }) => {
                        // Any AI turn runs detached; the handle is not needed here.
                        let _ = room.chat(conn, &message, timestamp).await;
                    }
                    Ok(ClientEvent::Ping {}) => {
                        deliver(conn, &tx, Outbound::JsonText(ServerEvent::Pong {}.to_json()));
                    }
                    Err(e) => {
                        debug!(conn=%conn, name=%persona, err=%e, "ignoring bad frame");
                    }
                },
                ws::Message::Close(_) => break,
                ws::Message::Binary(_) | ws::Message::Ping(_) | ws::Message::Pong(_) => {}
            }
        }
    }
    if state.close().is_some() {
        room.disconnect(conn).await;
    }

    drop(tx);
    let _ = writer.await;
    debug!(conn=%conn, state=?state, "ws client disconnected");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,doubt_server=info,tower_http=info".into()),
        )
        .with_target(false)
        .init();

    let cfg = parse_args();

    let mut room_cfg = RoomConfig::new(Catalog::for_mode(cfg.mode));
    room_cfg.history_cap = cfg.history_cap;
    if cfg.mode == Mode::Ai {
        room_cfg.responder = Some(ResponderConfig {
            base_url: cfg.ai_url.clone(),
            model: cfg.ai_model.clone(),
            probability: cfg.ai_probability,
            timeout: cfg.ai_timeout,
            ..ResponderConfig::default()
        });
    }
    let room = Room::new(room_cfg).context("build room")?;

    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/status", get(api_status))
        .route("/ws", get(ws_session))
        .with_state(AppState { room });
    if let Some(dir) = cfg.static_dir.as_ref() {
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
        info!("shutdown signal received");
    });

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(
        bind = %cfg.bind,
        mode = ?cfg.mode,
        ai_url = %cfg.ai_url,
        ai_probability = cfg.ai_probability,
        static_dir = ?cfg.static_dir,
        "doubt chat server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await
        .context("http server failed")?;
    Ok(())
}

async fn wait_for_shutdown(mut rx: tokio::sync::watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
