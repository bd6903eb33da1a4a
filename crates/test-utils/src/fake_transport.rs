use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chatshell::errors::ChatShellError;
use chatshell::transport::{
    BotIdentity, ChatMessage, ChatTransport, RoomInfo, TransportFuture,
};
use chrono::{DateTime, Utc};

use crate::builders::test_room;

/// A message the engine sent, with any attachment read at send time (the
/// scratch file is deleted right after).
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub room_id: String,
    pub text: String,
    pub attachment_name: Option<String>,
    pub attachment: Option<Vec<u8>>,
}

struct State {
    identity: BotIdentity,
    room: RoomInfo,
    /// Lower-cased address -> canonical address.
    people: HashMap<String, String>,
    inbox: Vec<ChatMessage>,
    sent: Vec<SentMessage>,
    failing_lists: usize,
    failing_sends: bool,
    list_calls: usize,
    next_id: u64,
}

/// In-memory chat service.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new(test_room())
    }
}

impl FakeTransport {
    pub fn new(room: RoomInfo) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                identity: BotIdentity {
                    display_name: "Shelly".to_string(),
                    nickname: "Shelly".to_string(),
                    is_bot: true,
                },
                room,
                people: HashMap::new(),
                inbox: Vec::new(),
                sent: Vec::new(),
                failing_lists: 0,
                failing_sends: false,
                list_calls: 0,
                next_id: 0,
            })),
        }
    }

    pub fn with_identity(self, identity: BotIdentity) -> Self {
        self.state.lock().unwrap().identity = identity;
        self
    }

    /// Make `address` resolvable.
    pub fn add_person(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .people
            .insert(address.to_lowercase(), address.to_string());
    }

    /// Post a message into the room, created now. Returns its ID.
    pub fn post(&self, sender: &str, text: &str) -> String {
        self.post_at(sender, text, Utc::now())
    }

    pub fn post_at(&self, sender: &str, text: &str, created_at: DateTime<Utc>) -> String {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = format!("msg-{}", s.next_id);
        s.inbox.push(ChatMessage {
            id: id.clone(),
            sender: sender.to_string(),
            text: text.to_string(),
            created_at,
            attachments: Vec::new(),
        });
        id
    }

    /// The next `n` listing calls fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.state.lock().unwrap().failing_lists = n;
    }

    pub fn fail_sends(&self, failing: bool) {
        self.state.lock().unwrap().failing_sends = failing;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

impl ChatTransport for FakeTransport {
    fn whoami(&self) -> TransportFuture<'_, BotIdentity> {
        let identity = self.state.lock().unwrap().identity.clone();
        Box::pin(async move { Ok(identity) })
    }

    fn get_room<'a>(&'a self, room_id: &'a str) -> TransportFuture<'a, RoomInfo> {
        let room = self.state.lock().unwrap().room.clone();
        Box::pin(async move {
            if room.id == room_id {
                Ok(room)
            } else {
                Err(ChatShellError::Transport(format!("room {room_id} not found")))
            }
        })
    }

    fn resolve_identity<'a>(&'a self, address: &'a str) -> TransportFuture<'a, String> {
        let found = self
            .state
            .lock()
            .unwrap()
            .people
            .get(&address.to_lowercase())
            .cloned();
        Box::pin(async move {
            found.ok_or_else(|| ChatShellError::Transport(format!("no person with address {address}")))
        })
    }

    fn list_recent_messages<'a>(
        &'a self,
        _room: &'a RoomInfo,
        since: DateTime<Utc>,
        max: usize,
    ) -> TransportFuture<'a, Vec<ChatMessage>> {
        let result = {
            let mut s = self.state.lock().unwrap();
            s.list_calls += 1;
            if s.failing_lists > 0 {
                s.failing_lists -= 1;
                Err(ChatShellError::Transport("listing failed".to_string()))
            } else {
                let recent: Vec<ChatMessage> = s
                    .inbox
                    .iter()
                    .filter(|m| m.created_at > since)
                    .cloned()
                    .collect();
                let skip = recent.len().saturating_sub(max);
                Ok(recent.into_iter().skip(skip).collect())
            }
        };
        Box::pin(async move { result })
    }

    fn send_message<'a>(
        &'a self,
        room_id: &'a str,
        text: &'a str,
        attachment: Option<&'a Path>,
    ) -> TransportFuture<'a, String> {
        let attachment_bytes = attachment.map(|p| std::fs::read(p).unwrap_or_default());
        let attachment_name =
            attachment.and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

        let result = {
            let mut s = self.state.lock().unwrap();
            if s.failing_sends {
                Err(ChatShellError::Transport("send failed".to_string()))
            } else {
                s.next_id += 1;
                let id = format!("sent-{}", s.next_id);
                s.sent.push(SentMessage {
                    room_id: room_id.to_string(),
                    text: text.to_string(),
                    attachment_name,
                    attachment: attachment_bytes,
                });
                Ok(id)
            }
        };
        Box::pin(async move { result })
    }
}
