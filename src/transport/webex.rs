// src/transport/webex.rs

//! Webex REST implementation of [`ChatTransport`].

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{BotIdentity, ChatMessage, ChatTransport, RoomInfo, RoomKind, TransportFuture};
use crate::errors::{ChatShellError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebexPerson {
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    nick_name: Option<String>,
    #[serde(rename = "type", default)]
    person_type: String,
}

#[derive(Debug, Deserialize)]
struct WebexPeople {
    #[serde(default)]
    items: Vec<WebexPerson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebexRoom {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    room_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebexMessage {
    id: String,
    #[serde(default)]
    person_email: String,
    #[serde(default)]
    text: String,
    created: DateTime<Utc>,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WebexMessages {
    #[serde(default)]
    items: Vec<WebexMessage>,
}

#[derive(Debug, Deserialize)]
struct WebexCreated {
    id: String,
}

/// HTTP client for the Webex API, authenticated with a bot token.
#[derive(Clone)]
pub struct WebexTransport {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl WebexTransport {
    pub fn new(api_base: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("chatshell/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create webex http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| ChatShellError::Transport(format!("GET {path}: {e}")))?;

        decode(path, response).await
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatShellError::Transport(format!(
            "{path} returned {status}: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ChatShellError::Transport(format!("decoding {path} response: {e}")))
}

impl ChatTransport for WebexTransport {
    fn whoami(&self) -> TransportFuture<'_, BotIdentity> {
        Box::pin(async move {
            let me: WebexPerson = self.get_json("people/me", &[]).await?;
            let nickname = me
                .nick_name
                .clone()
                .unwrap_or_else(|| me.display_name.clone());
            Ok(BotIdentity {
                display_name: me.display_name,
                nickname,
                is_bot: me.person_type == "bot",
            })
        })
    }

    fn get_room<'a>(&'a self, room_id: &'a str) -> TransportFuture<'a, RoomInfo> {
        Box::pin(async move {
            let room: WebexRoom = self.get_json(&format!("rooms/{room_id}"), &[]).await?;
            let kind = if room.room_type == "group" {
                RoomKind::Group
            } else {
                RoomKind::Direct
            };
            Ok(RoomInfo {
                id: room.id,
                title: room.title,
                kind,
            })
        })
    }

    fn resolve_identity<'a>(&'a self, address: &'a str) -> TransportFuture<'a, String> {
        Box::pin(async move {
            let people: WebexPeople = self
                .get_json(
                    "people",
                    &[("email", address.to_string()), ("max", "1".to_string())],
                )
                .await?;

            people
                .items
                .into_iter()
                .next()
                .and_then(|p| p.emails.into_iter().next())
                .ok_or_else(|| {
                    ChatShellError::Authorization(format!("no person found with email: {address}"))
                })
        })
    }

    fn list_recent_messages<'a>(
        &'a self,
        room: &'a RoomInfo,
        since: DateTime<Utc>,
        max: usize,
    ) -> TransportFuture<'a, Vec<ChatMessage>> {
        Box::pin(async move {
            let mut query = vec![("roomId", room.id.clone()), ("max", max.to_string())];
            if room.kind == RoomKind::Group {
                // Bots only see messages that mention them in group rooms.
                query.push(("mentionedPeople", "me".to_string()));
            }

            let listed: WebexMessages = self.get_json("messages", &query).await?;

            // Webex lists newest first.
            let mut messages: Vec<ChatMessage> = listed
                .items
                .into_iter()
                .filter(|m| m.created > since)
                .map(|m| ChatMessage {
                    id: m.id,
                    sender: m.person_email,
                    text: m.text,
                    created_at: m.created,
                    attachments: m.files,
                })
                .collect();
            messages.reverse();
            Ok(messages)
        })
    }

    fn send_message<'a>(
        &'a self,
        room_id: &'a str,
        text: &'a str,
        attachment: Option<&'a Path>,
    ) -> TransportFuture<'a, String> {
        Box::pin(async move {
            let url = format!("{}/messages", self.api_base);
            let request = self.http.post(&url).bearer_auth(&self.token);

            let request = match attachment {
                None => request.json(&json!({ "roomId": room_id, "markdown": text })),
                Some(path) => {
                    let bytes = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("reading attachment {}", path.display()))?;
                    let file_name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .ok_or_else(|| anyhow!("attachment path has no file name: {}", path.display()))?
                        .to_string();
                    let part = Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str("text/plain")
                        .map_err(|e| ChatShellError::Transport(format!("attachment mime: {e}")))?;
                    let mut form = Form::new().text("roomId", room_id.to_string());
                    if !text.is_empty() {
                        form = form.text("markdown", text.to_string());
                    }
                    request.multipart(form.part("files", part))
                }
            };

            let response = request
                .send()
                .await
                .map_err(|e| ChatShellError::Transport(format!("POST messages: {e}")))?;
            let created: WebexCreated = decode("messages", response).await?;
            debug!(message_id = %created.id, "message posted");
            Ok(created.id)
        })
    }
}
