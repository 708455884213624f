// 11.0: everything a room wants to happen outside itself goes through here. rooms never hold
// sockets or store handles, they push Dispatch items and the registry resolves them after the
// call returns. store work is described as a StoreTask and its answer comes back as a StoreOutcome.

use crate::leaderboard::{LeaderboardEntry, NewLeaderboardEntry, SessionResult};
use crate::pack::{EventPackInput, EventPackSummary};
use crate::protocol::ServerMessage;
use crate::storage::PackRecord;
use crate::types::{ClientId, ConnId, RoomId, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    /// Every connection currently joined to the room.
    Room,
    Client(ClientId),
}

#[derive(Debug, Clone)]
pub enum Dispatch {
    Message { audience: Audience, message: ServerMessage },
    /// A personalised `room_state` to every connection in the room.
    RoomStates,
    /// Fresh room listing to every connection on the server.
    RoomList,
    Store(StoreTask),
    SessionResults(Vec<SessionResult>),
    /// Drop a client's connection (kicks).
    Close(ClientId),
}

/// Ordered queue of dispatches produced by one room call.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Dispatch>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dispatch: Dispatch) {
        self.items.push(dispatch);
    }

    pub fn to_room(&mut self, message: ServerMessage) {
        self.push(Dispatch::Message {
            audience: Audience::Room,
            message,
        });
    }

    pub fn to_client(&mut self, client_id: &ClientId, message: ServerMessage) {
        self.push(Dispatch::Message {
            audience: Audience::Client(client_id.clone()),
            message,
        });
    }

    pub fn room_states(&mut self) {
        self.push(Dispatch::RoomStates);
    }

    pub fn room_list(&mut self) {
        self.push(Dispatch::RoomList);
    }

    pub fn store(&mut self, task: StoreTask) {
        self.push(Dispatch::Store(task));
    }

    pub fn close(&mut self, client_id: ClientId) {
        self.push(Dispatch::Close(client_id));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dispatch> {
        self.items.iter()
    }

    pub fn drain(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.items)
    }

    /// Messages addressed to one client, in order. Room-wide messages excluded.
    pub fn messages_for(&self, client_id: &ClientId) -> Vec<&ServerMessage> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Dispatch::Message {
                    audience: Audience::Client(id),
                    message,
                } if id == client_id => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn room_messages(&self) -> Vec<&ServerMessage> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Dispatch::Message {
                    audience: Audience::Room,
                    message,
                } => Some(message),
                _ => None,
            })
            .collect()
    }
}

// 11.1: store requests

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOrigin {
    /// `claim_leaderboard` from a joined connection.
    Room(ConnId),
    /// Auto-submit at session end. nobody waits for the answer.
    Auto,
    /// Out-of-band HTTP claim, answered by request id.
    Http(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimTicket {
    pub client_id: ClientId,
    pub room_id: RoomId,
    pub session_key: String,
    pub entry: NewLeaderboardEntry,
    pub origin: ClaimOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackPurpose {
    Detail,
    SetPack,
    JoinPack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackListTarget {
    Conn(ConnId),
    /// Every room, after a pack changed.
    Everyone,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreTask {
    CreateSession {
        room_id: RoomId,
        started_at: Timestamp,
        pack_id: String,
    },
    EndSession {
        session_id: String,
        ended_at: Timestamp,
    },
    InsertEntry(ClaimTicket),
    RefreshLeaderboard,
    ListPacks {
        reply_to: PackListTarget,
    },
    LoadPack {
        conn: ConnId,
        purpose: PackPurpose,
        pack_id: String,
    },
    CreatePack {
        conn: ConnId,
        input: EventPackInput,
    },
    UpdatePack {
        conn: ConnId,
        pack_id: String,
        input: EventPackInput,
        edit_token: Option<String>,
    },
    DeletePack {
        conn: ConnId,
        pack_id: String,
        edit_token: Option<String>,
    },
}

impl StoreTask {
    pub fn name(&self) -> &'static str {
        match self {
            StoreTask::CreateSession { .. } => "create_session",
            StoreTask::EndSession { .. } => "end_session",
            StoreTask::InsertEntry(_) => "insert_entry",
            StoreTask::RefreshLeaderboard => "refresh_leaderboard",
            StoreTask::ListPacks { .. } => "list_packs",
            StoreTask::LoadPack { .. } => "load_pack",
            StoreTask::CreatePack { .. } => "create_pack",
            StoreTask::UpdatePack { .. } => "update_pack",
            StoreTask::DeletePack { .. } => "delete_pack",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    SessionCreated {
        room_id: RoomId,
        started_at: Timestamp,
        session_id: Option<String>,
    },
    /// Nothing to report back (session end).
    Done,
    EntryInserted {
        ticket: ClaimTicket,
        entry: Option<LeaderboardEntry>,
    },
    /// `None` when the store could not answer.
    LeaderboardFetched(Option<Vec<LeaderboardEntry>>),
    PacksListed {
        reply_to: PackListTarget,
        packs: Vec<EventPackSummary>,
    },
    PackLoaded {
        conn: ConnId,
        purpose: PackPurpose,
        pack_id: String,
        record: Option<PackRecord>,
    },
    PackChanged {
        conn: ConnId,
        reply: ServerMessage,
        changed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_keeps_order_and_filters() {
        let alice = ClientId::new("alice");
        let bob = ClientId::new("bob");
        let mut out = Outbox::new();
        out.to_client(&alice, ServerMessage::Pong);
        out.to_room(ServerMessage::error("x"));
        out.room_list();
        out.to_client(&bob, ServerMessage::error("y"));
        out.to_client(&alice, ServerMessage::error("z"));

        assert_eq!(out.len(), 5);
        let kinds: Vec<&str> = out.messages_for(&alice).iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec!["pong", "error"]);
        assert_eq!(out.room_messages().len(), 1);

        let drained = out.drain();
        assert_eq!(drained.len(), 5);
        assert!(out.is_empty());
        assert!(matches!(drained[2], Dispatch::RoomList));
    }
}
