mod error;
mod live;
mod mutations;
mod optimistic;
mod validate;

pub use error::{StoreError, ValidationError};
pub use optimistic::OptimisticSlot;
pub use validate::{validate_decline_reason, validate_suggestion, MAX_PROPOSED_TIMES};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::api::{BookingApi, HttpBookingApi};
use crate::config::Config;
use crate::model::*;
use crate::notify::{NotifyHub, StoreChange};
use crate::realtime::{RealtimeConnector, WsConnector};

use live::LiveSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Owned copy of everything a view renders from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub bookings: Vec<Booking>,
    pub total_count: u64,
    pub pending_count: u64,
    pub urgent_count: u64,
    pub loading: bool,
    pub error: Option<String>,
    pub connection: ConnectionState,
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) view: Snapshot,
    /// Last fetch, replayed by `refresh`.
    pub(crate) last_query: Option<BookingQuery>,
}

impl StoreState {
    fn position(&self, booking_id: &str) -> Option<usize> {
        self.view.bookings.iter().position(|b| b.id == booking_id)
    }
}

/// Client-side view of one provider's bookings: list, counts, flags and the
/// live connection. Share it as `Arc<BookingsStore>`.
pub struct BookingsStore {
    provider_id: String,
    api: Arc<dyn BookingApi>,
    connector: Arc<dyn RealtimeConnector>,
    reconnect_delay: Duration,
    state: RwLock<StoreState>,
    /// `{committed, pending}` per booking id with an optimistic write applied.
    optimistic: DashMap<String, OptimisticSlot>,
    /// Booking ids with a confirm/decline/suggest outstanding.
    in_flight: DashSet<String>,
    live: Mutex<Option<LiveSession>>,
    notify: NotifyHub,
}

impl BookingsStore {
    pub fn new(
        provider_id: impl Into<String>,
        api: Arc<dyn BookingApi>,
        connector: Arc<dyn RealtimeConnector>,
        reconnect_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.into(),
            api,
            connector,
            reconnect_delay,
            state: RwLock::new(StoreState::default()),
            optimistic: DashMap::new(),
            in_flight: DashSet::new(),
            live: Mutex::new(None),
            notify: NotifyHub::new(),
        })
    }

    /// Store backed by the HTTP API and the WebSocket channel from `config`.
    pub fn from_config(provider_id: impl Into<String>, config: &Config) -> Result<Arc<Self>, StoreError> {
        let api = Arc::new(HttpBookingApi::new(config)?);
        let connector = Arc::new(WsConnector::new(config.ws_url.clone()));
        Ok(Self::new(provider_id, api, connector, config.reconnect_delay))
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.notify.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.view.clone()
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.state.read().await.view.bookings.clone()
    }

    pub async fn booking(&self, booking_id: &str) -> Option<Booking> {
        let state = self.state.read().await;
        state.position(booking_id).map(|pos| state.view.bookings[pos].clone())
    }

    pub async fn urgent_bookings(&self) -> Vec<Booking> {
        let now = Utc::now();
        self.state
            .read()
            .await
            .view
            .bookings
            .iter()
            .filter(|b| b.is_urgent_at(now))
            .cloned()
            .collect()
    }

    pub async fn pending_count(&self) -> u64 {
        self.state.read().await.view.pending_count
    }

    pub async fn urgent_count(&self) -> u64 {
        self.state.read().await.view.urgent_count
    }

    pub async fn total_count(&self) -> u64 {
        self.state.read().await.view.total_count
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.view.error.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.view.loading
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.view.connection
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    pub fn is_action_loading(&self, booking_id: &str) -> bool {
        self.in_flight.contains(booking_id)
    }

    // ── Housekeeping ─────────────────────────────────────────

    pub async fn clear_error(&self) {
        let mut state = self.state.write().await;
        if state.view.error.take().is_some() {
            self.notify.send(StoreChange::Error(None));
        }
    }

    /// Drop the list, counts and optimistic slots. The live connection is kept.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let connection = state.view.connection;
        state.view = Snapshot {
            connection,
            ..Snapshot::default()
        };
        state.last_query = None;
        self.optimistic.clear();
        self.notify.send(StoreChange::Reset);
    }

    async fn record_error(&self, error: &StoreError) {
        let message = error.to_string();
        self.state.write().await.view.error = Some(message.clone());
        self.notify.send(StoreChange::Error(Some(message)));
    }

    fn notify_counts(&self, view: &Snapshot) {
        self.notify.send(StoreChange::Counts {
            pending: view.pending_count,
            urgent: view.urgent_count,
        });
    }
}
