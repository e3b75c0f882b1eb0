//! Thin Matrix client-server API client
//!
//! The bridge needs exactly four things from Matrix: post a message, edit a
//! message, resolve a display name, and receive room events. This client
//! implements that narrow surface over plain HTTP rather than pulling in a
//! full SDK; the bridge consumes it through the [`MatrixRoom`] trait so tests
//! can substitute a recording mock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshlink_core::Backoff;

use crate::error::{MatrixError, Result};
use crate::event::MatrixEvent;
use crate::room::MatrixRoom;

/// Long-poll timeout for `/sync`, in milliseconds
const SYNC_TIMEOUT_MS: u64 = 30_000;

/// Settings for the Matrix collaborator
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    /// Homeserver base URL, e.g. `https://matrix.example.org`
    pub homeserver: String,
    /// Full user id, e.g. `@bridge:example.org`
    pub user: String,
    /// Password for `m.login.password` (a `syt_` value is treated as a token)
    pub password: Option<String>,
    /// Access token, skips the login round-trip
    pub token: Option<String>,
    /// Room id or `#alias` to bridge
    pub room: String,
}

/// HTTP implementation of the Matrix collaborator
pub struct HttpMatrixClient {
    http: reqwest::Client,
    homeserver: String,
    access_token: String,
    user_id: String,
    room_id: String,
    txn_prefix: String,
    txn_counter: AtomicU64,
}

impl HttpMatrixClient {
    /// Authenticate against the homeserver and resolve the configured room.
    ///
    /// Fails fast on bad credentials or an unresolvable room; both are
    /// startup errors for the bridge.
    pub async fn connect(config: &MatrixConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        let homeserver = config.homeserver.trim_end_matches('/').to_string();

        // An access token may arrive as MATRIX_TOKEN or as a syt_-prefixed
        // password pasted into the password slot
        let token_from_password = config
            .password
            .as_deref()
            .filter(|p| p.starts_with("syt_"))
            .map(str::to_string);
        let access_token = match config.token.clone().or(token_from_password) {
            Some(token) => {
                info!("Using configured access token");
                token
            }
            None => {
                let password = config.password.as_deref().ok_or_else(|| {
                    MatrixError::Auth("neither a password nor a token is configured".to_string())
                })?;
                login(&http, &homeserver, &config.user, password).await?
            }
        };

        let mut client = Self {
            http,
            homeserver,
            access_token,
            user_id: config.user.clone(),
            room_id: config.room.clone(),
            txn_prefix: format!("meshlink{:08x}", rand::random::<u32>()),
            txn_counter: AtomicU64::new(0),
        };

        if client.room_id.starts_with('#') {
            client.room_id = client.resolve_alias(&config.room).await?;
            info!(room = %client.room_id, alias = %config.room, "Resolved room alias");
        }
        Ok(client)
    }

    /// The bridge's own user id, used to filter echoes of its messages
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The resolved room id
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn resolve_alias(&self, alias: &str) -> Result<String> {
        let url = format!(
            "{}/_matrix/client/v3/directory/room/{}",
            self.homeserver,
            encode_segment(alias)
        );
        let response = self.http.get(url).send().await?;
        let value = expect_json(response).await?;
        value
            .get("room_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MatrixError::RoomNotFound(alias.to_string()))
    }

    fn next_txn_id(&self) -> String {
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.txn_prefix, n)
    }

    async fn send_room_event(&self, content: Value) -> Result<String> {
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.homeserver,
            encode_segment(&self.room_id),
            self.next_txn_id()
        );
        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&content)
            .send()
            .await?;
        let value = expect_json(response).await?;
        value
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MatrixError::BadResponse("send response without event_id".to_string()))
    }

    async fn sync_once(&self, since: Option<&str>) -> Result<Value> {
        let mut url = format!(
            "{}/_matrix/client/v3/sync?timeout={}",
            self.homeserver, SYNC_TIMEOUT_MS
        );
        if let Some(since) = since {
            url.push_str("&since=");
            url.push_str(&encode_segment(since));
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Run the sync loop, delivering room events to the bridge.
    ///
    /// The first sync establishes a position without replaying history.
    /// Transient failures back off and retry forever; the loop ends when the
    /// bridge drops its receiver.
    pub fn spawn_sync(self: &Arc<Self>, events: mpsc::Sender<MatrixEvent>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff = Backoff::default();
            let mut since: Option<String> = None;
            info!(room = %client.room_id, "Matrix sync loop started");
            loop {
                match client.sync_once(since.as_deref()).await {
                    Ok(response) => {
                        backoff.reset();
                        let next_batch = response
                            .get("next_batch")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        // Events before our first position are history the
                        // bridge must not replay onto the mesh
                        if since.is_some() {
                            for event in client.room_events(&response) {
                                if event.sender() == client.user_id {
                                    continue;
                                }
                                if events.send(event).await.is_err() {
                                    info!("Bridge channel closed, stopping Matrix sync");
                                    return;
                                }
                            }
                        }
                        since = next_batch.or(since);
                    }
                    Err(e) => {
                        let delay = backoff.next();
                        warn!(error = %e, delay_secs = delay.as_secs(), "Matrix sync failed");
                        tokio::time::sleep(delay).await;
                    }
                }
                if events.is_closed() {
                    return;
                }
            }
        })
    }

    fn room_events(&self, sync_response: &Value) -> Vec<MatrixEvent> {
        sync_response
            .get("rooms")
            .and_then(|r| r.get("join"))
            .and_then(|j| j.get(&self.room_id))
            .and_then(|room| room.get("timeline"))
            .and_then(|t| t.get("events"))
            .and_then(Value::as_array)
            .map(|events| {
                events
                    .iter()
                    .filter_map(MatrixEvent::from_timeline)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MatrixRoom for HttpMatrixClient {
    async fn post_message(
        &self,
        plain: &str,
        html: &str,
        in_reply_to: Option<&str>,
    ) -> Result<String> {
        let mut content = json!({
            "msgtype": "m.text",
            "body": plain,
            "format": "org.matrix.custom.html",
            "formatted_body": html,
        });
        if let Some(parent) = in_reply_to {
            content["m.relates_to"] = json!({"m.in_reply_to": {"event_id": parent}});
        }
        let event_id = self.send_room_event(content).await?;
        debug!(event = %event_id, "Posted room message");
        Ok(event_id)
    }

    async fn edit_message(&self, event_id: &str, plain: &str, html: &str) -> Result<()> {
        let content = json!({
            "msgtype": "m.text",
            "body": plain,
            "format": "org.matrix.custom.html",
            "formatted_body": html,
            "m.new_content": {
                "msgtype": "m.text",
                "body": plain,
                "format": "org.matrix.custom.html",
                "formatted_body": html,
            },
            "m.relates_to": {
                "rel_type": "m.replace",
                "event_id": event_id,
            },
        });
        self.send_room_event(content).await?;
        debug!(event = %event_id, "Edited room message");
        Ok(())
    }

    /// Room nickname first, then global profile name, then the bare user id
    async fn display_name(&self, user_id: &str) -> String {
        let member_url = format!(
            "{}/_matrix/client/v3/rooms/{}/state/m.room.member/{}",
            self.homeserver,
            encode_segment(&self.room_id),
            encode_segment(user_id)
        );
        if let Some(name) = self.fetch_displayname(&member_url, "displayname").await {
            return name;
        }
        let profile_url = format!(
            "{}/_matrix/client/v3/profile/{}/displayname",
            self.homeserver,
            encode_segment(user_id)
        );
        if let Some(name) = self.fetch_displayname(&profile_url, "displayname").await {
            return name;
        }
        user_id.to_string()
    }
}

impl HttpMatrixClient {
    async fn fetch_displayname(&self, url: &str, field: &str) -> Option<String> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .ok()?;
        let value = expect_json(response).await.ok()?;
        value
            .get(field)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

async fn login(
    http: &reqwest::Client,
    homeserver: &str,
    user: &str,
    password: &str,
) -> Result<String> {
    let url = format!("{}/_matrix/client/v3/login", homeserver);
    let body = json!({
        "type": "m.login.password",
        "identifier": {"type": "m.id.user", "user": user},
        "password": password,
    });
    let response = http.post(url).json(&body).send().await?;
    if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
        return Err(MatrixError::Auth(format!(
            "login rejected for {}",
            user
        )));
    }
    let value = expect_json(response).await?;
    let token = value
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| MatrixError::BadResponse("login response without access_token".to_string()))?;
    info!(user = %user, "Logged in to Matrix");
    Ok(token.to_string())
}

async fn expect_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MatrixError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<Value>().await?)
}

/// Percent-encode one URL path segment
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~' | b':' | b'@');
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
