use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use unoroom_protocol::{ClientToServer, ServerToClient};
use uuid::Uuid;

mod broadcast;
mod coordinator;
mod error;
mod game;
mod rooms;
mod store;

use broadcast::Broadcaster;
use coordinator::MatchCoordinator;
use rooms::RoomRegistry;
use store::MatchStore;

const DEFAULT_LIST_WINDOW_MINS: i64 = 60;

#[derive(Parser, Debug)]
#[command(name = "unoroom-server", about = "WebSocket UNO match server")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:9001")]
    bind: String,
    /// Directory for match documents
    #[arg(long, default_value = "./match_data")]
    data_dir: PathBuf,
    /// Minutes before an idle room is collected
    #[arg(long, default_value_t = 30)]
    room_ttl_mins: u64,
    /// Milliseconds to wait for a busy match before rejecting an action
    #[arg(long, default_value_t = 5000)]
    lock_wait_ms: u64,
}

#[derive(Clone)]
struct AppState {
    coordinator: Arc<MatchCoordinator>,
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<Broadcaster>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let store = MatchStore::new(&args.data_dir)?;
    let state = AppState {
        coordinator: Arc::new(MatchCoordinator::new(
            store,
            Duration::from_millis(args.lock_wait_ms),
        )),
        registry: Arc::new(RoomRegistry::new(Duration::from_secs(
            args.room_ttl_mins * 60,
        ))),
        broadcaster: Arc::new(Broadcaster::new()),
    };

    // idle-room collector
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let removed = registry.cleanup_idle();
            if removed > 0 {
                info!(removed, "collected idle rooms");
            }
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(addr = %args.bind, data_dir = %args.data_dir.display(), "listening on ws://{}/ws", args.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = mpsc::unbounded_channel::<ServerToClient>();

    tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(err) => {
                    error!(%err, "failed to encode outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let my_id = Uuid::new_v4();
    state.broadcaster.register(my_id, tx_out.clone());
    let _ = tx_out.send(ServerToClient::Hello { your_id: my_id });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(t) => {
                if let Ok(cmd) = serde_json::from_str::<ClientToServer>(&t) {
                    route_cmd(cmd, &state, my_id, &tx_out).await;
                } else {
                    let _ = tx_out.send(ServerToClient::Error {
                        message: "bad json".into(),
                    });
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // implicit leave goes through the same serialized path as an explicit
    // one; failures are logged and never propagate
    disconnect_cleanup(&state, my_id).await;
    state.broadcaster.unregister(my_id);
}

async fn disconnect_cleanup(state: &AppState, my_id: Uuid) {
    let Some(match_id) = state.registry.room_of(my_id) else {
        return;
    };
    match state.coordinator.leave_match(match_id, my_id).await {
        Ok(out) => {
            state.registry.leave_room(my_id);
            if let Some(delta) = out.delta {
                let members = state.registry.members_of(match_id);
                state.broadcaster.publish(&members, &delta);
            }
            info!(%match_id, conn = %my_id, deleted = out.match_deleted, "disconnected player removed");
        }
        Err(err) => {
            warn!(%match_id, conn = %my_id, %err, "disconnect cleanup failed");
        }
    }
}

async fn route_cmd(
    cmd: ClientToServer,
    state: &AppState,
    my_id: Uuid,
    tx_out: &mpsc::UnboundedSender<ServerToClient>,
) {
    match cmd {
        ClientToServer::CreateMatch { name, max_players } => {
            match state.coordinator.create_match(my_id, &name, max_players).await {
                Ok(out) => {
                    state
                        .registry
                        .create_room(out.match_id, my_id, name.trim(), max_players, true);
                    let _ = tx_out.send(ServerToClient::Created {
                        match_id: out.match_id,
                        view: out.view,
                    });
                    let members = state.registry.members_of(out.match_id);
                    state.broadcaster.publish(&members, &out.delta);
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::JoinMatch { match_id, name } => {
            match state.coordinator.join_match(match_id, my_id, &name).await {
                Ok(out) => {
                    state
                        .registry
                        .join_room(match_id, my_id, name.trim(), out.view.max_players);
                    let _ = tx_out.send(ServerToClient::Joined { view: out.view });
                    let members = state.registry.members_of(match_id);
                    state.broadcaster.publish(&members, &out.delta);
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::StartMatch => {
            let Some(match_id) = state.registry.room_of(my_id) else {
                return send_error_msg(tx_out, "you are not in a match");
            };
            match state.coordinator.start_match(match_id, my_id).await {
                Ok(out) => {
                    state.registry.touch(match_id);
                    let _ = tx_out.send(ServerToClient::Started {
                        view: out.view,
                        discard_top: out.discard_top,
                        current_player_id: out.current_player_id,
                    });
                    let members = state.registry.members_of(match_id);
                    state.broadcaster.publish(&members, &out.delta);
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::PlayCard {
            card_index,
            chosen_color,
        } => {
            let Some(match_id) = state.registry.room_of(my_id) else {
                return send_error_msg(tx_out, "you are not in a match");
            };
            match state
                .coordinator
                .play_card(match_id, my_id, card_index, chosen_color)
                .await
            {
                Ok(out) => {
                    state.registry.touch(match_id);
                    let _ = tx_out.send(ServerToClient::Played {
                        view: out.view,
                        next_player_id: out.next_player_id,
                        winner: out.winner,
                    });
                    let members = state.registry.members_of(match_id);
                    state.broadcaster.publish(&members, &out.delta);
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::DrawCard {
            auto_play,
            chosen_color,
        } => {
            let Some(match_id) = state.registry.room_of(my_id) else {
                return send_error_msg(tx_out, "you are not in a match");
            };
            match state
                .coordinator
                .draw_card(match_id, my_id, auto_play, chosen_color)
                .await
            {
                Ok(out) => {
                    state.registry.touch(match_id);
                    let _ = tx_out.send(ServerToClient::CardDrawn {
                        card: out.card,
                        playable: out.playable,
                        auto_played: out.auto_played,
                        view: out.view,
                    });
                    let members = state.registry.members_of(match_id);
                    state.broadcaster.publish(&members, &out.delta);
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::LeaveMatch => {
            let Some(match_id) = state.registry.room_of(my_id) else {
                let _ = tx_out.send(ServerToClient::Left {
                    remaining_players: Vec::new(),
                    match_deleted: false,
                });
                return;
            };
            match state.coordinator.leave_match(match_id, my_id).await {
                Ok(out) => {
                    state.registry.leave_room(my_id);
                    let _ = tx_out.send(ServerToClient::Left {
                        remaining_players: out.remaining,
                        match_deleted: out.match_deleted,
                    });
                    if let Some(delta) = out.delta {
                        let members = state.registry.members_of(match_id);
                        state.broadcaster.publish(&members, &delta);
                    }
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::GetState => {
            let Some(match_id) = state.registry.room_of(my_id) else {
                return send_error_msg(tx_out, "you are not in a match");
            };
            match state.coordinator.get_state(match_id, my_id).await {
                Ok(view) => {
                    let _ = tx_out.send(ServerToClient::State { view });
                }
                Err(err) => send_error(tx_out, err),
            }
        }

        ClientToServer::ListMatches { recent_minutes } => {
            let window =
                chrono::Duration::minutes(recent_minutes.unwrap_or(DEFAULT_LIST_WINDOW_MINS));
            match state.coordinator.list_open(window).await {
                Ok(matches) => {
                    let _ = tx_out.send(ServerToClient::MatchList { matches });
                }
                Err(err) => send_error(tx_out, err),
            }
        }
    }
}

fn send_error(tx_out: &mpsc::UnboundedSender<ServerToClient>, err: error::ApiError) {
    let _ = tx_out.send(ServerToClient::Error {
        message: err.to_string(),
    });
}

fn send_error_msg(tx_out: &mpsc::UnboundedSender<ServerToClient>, message: &str) {
    let _ = tx_out.send(ServerToClient::Error {
        message: message.into(),
    });
}
