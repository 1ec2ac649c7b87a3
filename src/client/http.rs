//! HTTP Backend
//!
//! REST and auth calls over `reqwest`, the change-feed over a
//! `tokio-tungstenite` websocket.

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use super::{Backend, ClientError, ClientResult, FeedMessage, Subscription, SubscriptionStatus};
use crate::api::dto::{InsertBookmarkRequest, SessionResponse, UserResponse};
use crate::api::error::ErrorResponse;
use crate::config::BackendConfig;
use crate::realtime::{ChannelSpec, ClientMessage, ServerMessage};
use crate::store::{Bookmark, Filter, NewBookmark, SelectQuery, Session, User};

/// Session token picked up by [`HttpBackend::from_env`]
pub const ENV_ACCESS_TOKEN: &str = "BOOKMARK_ACCESS_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `subscribe` waits for the server to confirm a join
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a running bookmark server
pub struct HttpBackend {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    access_token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> ClientResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
            access_token: RwLock::new(None),
        })
    }

    /// Build from `BOOKMARK_BACKEND_URL` / `BOOKMARK_BACKEND_KEY`, picking up
    /// `BOOKMARK_ACCESS_TOKEN` when set
    pub fn from_env() -> ClientResult<Self> {
        let backend = Self::new(&BackendConfig::from_env()?)?;
        if let Some(token) = std::env::var(ENV_ACCESS_TOKEN).ok().filter(|t| !t.is_empty()) {
            backend.set_access_token(Some(token));
        }
        Ok(backend)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Revoke the current session and forget the token
    pub async fn sign_out(&self) -> ClientResult<()> {
        if self.access_token().is_none() {
            return Ok(());
        }
        let response = self.request(Method::POST, "/auth/v1/logout").send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        self.set_access_token(None);
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key);
        match self.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(api_error(response).await)
        }
    }

    /// Websocket URL of the change-feed for a session token
    fn realtime_url(&self, token: &str) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&access_token={}",
            base,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(token)
        )
    }
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => ClientError::Api {
            status: status.as_u16(),
            code: body.error.code,
            message: body.error.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: "HTTP_ERROR".to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        },
    }
}

/// Read frames until the server confirms `channel`
async fn await_joined<S>(source: &mut S, channel: &str) -> ClientResult<()>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(ClientError::Realtime(e.to_string())),
        };
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::Joined { channel: joined }) if joined == channel => return Ok(()),
            Ok(ServerMessage::ChannelError { channel, message }) => {
                return Err(ClientError::Realtime(format!("channel {}: {}", channel, message)));
            }
            Ok(ServerMessage::Error { message }) => return Err(ClientError::Realtime(message)),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unknown realtime frame");
            }
        }
    }
    Err(ClientError::Realtime(format!(
        "channel {}: connection closed before join",
        channel
    )))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        if self.access_token().is_none() {
            return Ok(None);
        }
        let body: SessionResponse = self
            .send(self.request(Method::GET, "/auth/v1/session"))
            .await?;
        Ok(body.session)
    }

    async fn get_user(&self) -> ClientResult<Option<User>> {
        if self.access_token().is_none() {
            return Ok(None);
        }
        let response = self.request(Method::GET, "/auth/v1/user").send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(None),
            status if status.is_success() => {
                let body: UserResponse = response.json().await?;
                Ok(Some(body.user))
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> ClientResult<String> {
        Ok(format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}&apikey={}",
            self.base_url,
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to),
            urlencoding::encode(&self.api_key)
        ))
    }

    async fn select_bookmarks(&self, query: SelectQuery) -> ClientResult<Vec<Bookmark>> {
        self.send(
            self.request(Method::GET, "/rest/v1/bookmarks")
                .query(&query.to_params()),
        )
        .await
    }

    async fn insert_bookmark(&self, new: NewBookmark) -> ClientResult<Bookmark> {
        let body = InsertBookmarkRequest {
            title: new.title,
            url: new.url,
            user_id: Some(new.user_id),
        };
        self.send(self.request(Method::POST, "/rest/v1/bookmarks").json(&body))
            .await
    }

    async fn delete_bookmarks(&self, filters: Vec<Filter>) -> ClientResult<Vec<Bookmark>> {
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_param).collect();
        self.send(
            self.request(Method::DELETE, "/rest/v1/bookmarks")
                .query(&params),
        )
        .await
    }

    async fn subscribe(&self, channel: ChannelSpec) -> ClientResult<Subscription> {
        let token = self.access_token().ok_or(ClientError::NotAuthenticated)?;
        let (stream, _) = tokio_tungstenite::connect_async(self.realtime_url(&token))
            .await
            .map_err(|e| ClientError::Realtime(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let join = ClientMessage::Join {
            channel: channel.name.clone(),
            changes: channel.changes.clone(),
        };
        let text = serde_json::to_string(&join).map_err(|e| ClientError::Realtime(e.to_string()))?;
        sink.send(WsMessage::Text(text))
            .await
            .map_err(|e| ClientError::Realtime(e.to_string()))?;

        // Changes committed before the ack may be missed, so the caller only
        // gets the subscription once the server has joined the channel
        tokio::time::timeout(JOIN_TIMEOUT, await_joined(&mut source, &channel.name))
            .await
            .map_err(|_| {
                ClientError::Realtime(format!("channel {}: join timed out", channel.name))
            })??;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(FeedMessage::Status(SubscriptionStatus::Subscribed));
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let name = channel.name.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        let leave = ClientMessage::Leave { channel: name.clone() };
                        if let Ok(text) = serde_json::to_string(&leave) {
                            let _ = sink.send(WsMessage::Text(text)).await;
                        }
                        let _ = sink.close().await;
                        break;
                    }
                    frame = source.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(msg) => {
                                    if let Some(feed) = FeedMessage::from_server(msg) {
                                        if events_tx.send(feed).is_err() {
                                            break;
                                        }
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "Ignoring unknown realtime frame");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            let _ = events_tx.send(FeedMessage::Status(SubscriptionStatus::Closed));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, channel = %name, "Realtime connection failed");
                            let _ = events_tx.send(FeedMessage::Error(e.to_string()));
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(channel.name, events_rx, cancel_tx))
    }
}
