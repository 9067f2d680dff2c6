use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use unoroom_protocol::MatchSummary;
use uuid::Uuid;

/// Process-local bookkeeping for live connections, keyed by match id.
/// Advisory only: the persisted match document is the source of truth and
/// this map is never consulted to reconstruct outcomes.
pub struct RoomRegistry {
    inner: Mutex<Inner>,
    idle_ttl: Duration,
}

struct Inner {
    rooms: HashMap<Uuid, Room>,
    member_room: HashMap<Uuid, Uuid>,
}

#[derive(Debug)]
pub struct Room {
    pub match_id: Uuid,
    pub host_id: Uuid,
    pub members: Vec<RoomMember>,
    pub max_players: usize,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoomMember {
    pub id: Uuid,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// What happened when a member left their room.
#[derive(Debug, Clone, Copy)]
pub struct LeftRoom {
    pub match_id: Uuid,
    pub room_deleted: bool,
    pub new_host: Option<Uuid>,
}

impl RoomRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        RoomRegistry {
            inner: Mutex::new(Inner {
                rooms: HashMap::new(),
                member_room: HashMap::new(),
            }),
            idle_ttl,
        }
    }

    pub fn create_room(&self, match_id: Uuid, host_id: Uuid, host_name: &str, max_players: usize, visible: bool) {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        inner.rooms.insert(
            match_id,
            Room {
                match_id,
                host_id,
                members: vec![RoomMember {
                    id: host_id,
                    name: host_name.to_string(),
                    joined_at: now,
                }],
                max_players,
                visible,
                created_at: now,
                last_activity: now,
            },
        );
        inner.member_room.insert(host_id, match_id);
    }

    /// Register a connection in a room, minting the room if the registry
    /// missed its creation (e.g. it was idle-collected while the match
    /// document lived on).
    pub fn join_room(&self, match_id: Uuid, player_id: Uuid, name: &str, max_players: usize) {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let room = inner.rooms.entry(match_id).or_insert_with(|| Room {
            match_id,
            host_id: player_id,
            members: Vec::new(),
            max_players,
            visible: true,
            created_at: now,
            last_activity: now,
        });
        if !room.members.iter().any(|m| m.id == player_id) {
            room.members.push(RoomMember {
                id: player_id,
                name: name.to_string(),
                joined_at: now,
            });
        }
        room.last_activity = now;
        inner.member_room.insert(player_id, match_id);
    }

    /// Remove the member from their room; the earliest remaining member
    /// inherits host, an emptied room is dropped.
    pub fn leave_room(&self, player_id: Uuid) -> Option<LeftRoom> {
        let mut inner = self.inner.lock();
        let match_id = inner.member_room.remove(&player_id)?;
        let room = inner.rooms.get_mut(&match_id)?;
        room.members.retain(|m| m.id != player_id);
        room.last_activity = Utc::now();
        if room.members.is_empty() {
            inner.rooms.remove(&match_id);
            return Some(LeftRoom {
                match_id,
                room_deleted: true,
                new_host: None,
            });
        }
        let mut new_host = None;
        if room.host_id == player_id {
            room.host_id = room.members[0].id;
            new_host = Some(room.host_id);
        }
        Some(LeftRoom {
            match_id,
            room_deleted: false,
            new_host,
        })
    }

    pub fn transfer_host(&self, match_id: Uuid, from: Uuid, to: Uuid) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(&match_id) else {
            return false;
        };
        if room.host_id != from || !room.members.iter().any(|m| m.id == to) {
            return false;
        }
        room.host_id = to;
        room.last_activity = Utc::now();
        true
    }

    pub fn room_of(&self, player_id: Uuid) -> Option<Uuid> {
        self.inner.lock().member_room.get(&player_id).copied()
    }

    pub fn members_of(&self, match_id: Uuid) -> Vec<Uuid> {
        self.inner
            .lock()
            .rooms
            .get(&match_id)
            .map(|r| r.members.iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }

    pub fn touch(&self, match_id: Uuid) {
        if let Some(room) = self.inner.lock().rooms.get_mut(&match_id) {
            room.last_activity = Utc::now();
        }
    }

    /// Visible, joinable rooms, most recently active first.
    pub fn public_rooms(&self) -> Vec<MatchSummary> {
        let inner = self.inner.lock();
        let mut rooms: Vec<&Room> = inner
            .rooms
            .values()
            .filter(|r| r.visible && r.members.len() < r.max_players)
            .collect();
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        rooms
            .into_iter()
            .map(|r| MatchSummary {
                match_id: r.match_id,
                host_name: r
                    .members
                    .iter()
                    .find(|m| m.id == r.host_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_default(),
                current_players: r.members.len(),
                max_players: r.max_players,
            })
            .collect()
    }

    /// Drop rooms idle longer than the TTL along with their member
    /// mappings. Returns how many were collected.
    pub fn cleanup_idle(&self) -> usize {
        let mut inner = self.inner.lock();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.idle_ttl).unwrap_or_else(|_| chrono::Duration::minutes(30));
        let stale: Vec<Uuid> = inner
            .rooms
            .values()
            .filter(|r| r.last_activity < cutoff)
            .map(|r| r.match_id)
            .collect();
        for match_id in &stale {
            if let Some(room) = inner.rooms.remove(match_id) {
                for m in &room.members {
                    inner.member_room.remove(&m.id);
                }
                debug!(%match_id, "idle room collected");
            }
        }
        stale.len()
    }
}
