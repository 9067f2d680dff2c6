use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use unoroom_protocol::ServerToClient;
use uuid::Uuid;

use crate::coordinator::StateDelta;

/// Connection-id -> outbound-channel map. Owns message fan-out so nothing
/// else ever holds a socket; a dropped channel is skipped, never fatal.
#[derive(Default)]
pub struct Broadcaster {
    conns: Mutex<HashMap<Uuid, UnboundedSender<ServerToClient>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn_id: Uuid, tx: UnboundedSender<ServerToClient>) {
        self.conns.lock().insert(conn_id, tx);
    }

    pub fn unregister(&self, conn_id: Uuid) {
        self.conns.lock().remove(&conn_id);
    }

    pub fn send_to(&self, conn_id: Uuid, msg: ServerToClient) {
        let tx = self.conns.lock().get(&conn_id).cloned();
        match tx {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!(%conn_id, "outbound channel closed, dropping message");
                }
            }
            None => debug!(%conn_id, "no outbound channel for connection"),
        }
    }

    /// Fan a post-mutation delta out to the room: one shared `StateChanged`
    /// per member (hand counts only), then each member's own hand and
    /// nobody else's.
    pub fn publish(&self, members: &[Uuid], delta: &StateDelta) {
        debug_assert!(
            delta.shared.players.iter().all(|p| p.cards.is_none()),
            "shared view must not carry hands"
        );
        for member in members {
            self.send_to(
                *member,
                ServerToClient::StateChanged {
                    view: delta.shared.clone(),
                },
            );
        }
        for (player_id, hand) in &delta.hands {
            if members.contains(player_id) {
                self.send_to(
                    *player_id,
                    ServerToClient::YourHand {
                        cards: hand.clone(),
                    },
                );
            }
        }
    }
}
