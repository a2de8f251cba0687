use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::model::Booking;
use crate::store::StoreError;

pub const EVENT_NEW: &str = "booking.new";
pub const EVENT_CANCELLED: &str = "booking.cancelled";
pub const EVENT_EXPIRING_SOON: &str = "booking.expiring_soon";

/// Booking reference carried by cancel/expiry pushes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookingRef {
    #[serde(rename = "bookingId", alias = "id")]
    pub booking_id: String,
}

/// Inbound `{ type, data }` envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "booking.new")]
    BookingNew(Booking),
    #[serde(rename = "booking.cancelled")]
    BookingCancelled(BookingRef),
    #[serde(rename = "booking.expiring_soon")]
    BookingExpiringSoon(BookingRef),
}

impl RealtimeEvent {
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RealtimeEvent::BookingNew(_) => EVENT_NEW,
            RealtimeEvent::BookingCancelled(_) => EVENT_CANCELLED,
            RealtimeEvent::BookingExpiringSoon(_) => EVENT_EXPIRING_SOON,
        }
    }
}

/// One open realtime connection. `None` from `next_text` means the peer closed.
#[async_trait]
pub trait RealtimeSocket: Send {
    async fn next_text(&mut self) -> Option<Result<String, StoreError>>;
    async fn close(&mut self);
}

/// Opens realtime connections for a provider.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, provider_id: &str) -> Result<Box<dyn RealtimeSocket>, StoreError>;
}

/// `<base>?userId=<provider>&type=provider`, with the provider id percent-encoded.
pub fn provider_url(base: &str, provider_id: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    let provider_id = urlencoding::encode(provider_id);
    format!("{base}{sep}userId={provider_id}&type=provider")
}

// ── tokio-tungstenite implementation ─────────────────────────────

pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RealtimeConnector for WsConnector {
    async fn connect(&self, provider_id: &str) -> Result<Box<dyn RealtimeSocket>, StoreError> {
        let url = provider_url(&self.base_url, provider_id);
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RealtimeSocket for WsSocket {
    async fn next_text(&mut self) -> Option<Result<String, StoreError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!("realtime close frame: {frame:?}");
                    return None;
                }
                // pings are answered by tungstenite on the next read
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("realtime close: {e}");
        }
    }
}
