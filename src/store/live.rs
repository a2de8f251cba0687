use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notify::StoreChange;
use crate::observability;
use crate::realtime::{RealtimeEvent, RealtimeSocket};

use super::{BookingsStore, ConnectionState};

/// One provider's realtime session: the task that owns the socket and its
/// reconnect timer, and the token that stops both.
pub(super) struct LiveSession {
    provider_id: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

enum PumpExit {
    Cancelled,
    Closed,
    Errored,
}

impl BookingsStore {
    /// Open the realtime connection for `provider_id`. A live session for the
    /// same provider is kept; one for another provider is shut down first.
    pub async fn connect_websocket(self: &Arc<Self>, provider_id: &str) {
        let mut live = self.live.lock().await;
        if let Some(session) = live.as_ref()
            && session.provider_id == provider_id
            && !session.task.is_finished()
        {
            debug!("realtime session for {provider_id} already running");
            return;
        }
        if let Some(old) = live.take() {
            old.token.cancel();
            let _ = old.task.await;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run_session(
            Arc::clone(self),
            provider_id.to_string(),
            token.clone(),
        ));
        *live = Some(LiveSession {
            provider_id: provider_id.to_string(),
            token,
            task,
        });
    }

    /// Close the connection and stop reconnecting. Safe to call repeatedly.
    pub async fn disconnect_websocket(&self) {
        let session = self.live.lock().await.take();
        if let Some(session) = session {
            session.token.cancel();
            let _ = session.task.await;
            info!("realtime session for {} closed", session.provider_id);
        }
        self.set_connection(ConnectionState::Disconnected).await;
    }

    async fn set_connection(&self, connection: ConnectionState) {
        let mut state = self.state.write().await;
        if state.view.connection == connection {
            return;
        }
        state.view.connection = connection;
        let connected = if connection == ConnectionState::Connected { 1.0 } else { 0.0 };
        metrics::gauge!(observability::REALTIME_CONNECTED).set(connected);
        self.notify.send(StoreChange::Connection(connection));
    }

    /// Read frames until the peer closes, the read fails, or the session is cancelled.
    async fn pump(&self, socket: &mut dyn RealtimeSocket, token: &CancellationToken) -> PumpExit {
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return PumpExit::Cancelled,
                next = socket.next_text() => next,
            };
            match next {
                Some(Ok(text)) => self.handle_message(&text).await,
                Some(Err(e)) => {
                    warn!("realtime read error: {e}");
                    self.set_connection(ConnectionState::Disconnected).await;
                    return PumpExit::Errored;
                }
                None => return PumpExit::Closed,
            }
        }
    }

    async fn handle_message(&self, text: &str) {
        match RealtimeEvent::parse(text) {
            Ok(event) => {
                metrics::counter!(observability::REALTIME_EVENTS_TOTAL, "event" => event.label())
                    .increment(1);
                self.apply_event(event).await;
            }
            Err(e) => {
                metrics::counter!(observability::REALTIME_MALFORMED_TOTAL).increment(1);
                warn!("dropping malformed realtime message: {e}");
            }
        }
    }

    /// Fold one pushed event into the list and counts.
    pub async fn apply_event(&self, event: RealtimeEvent) {
        let mut state = self.state.write().await;
        match event {
            RealtimeEvent::BookingNew(booking) => {
                let id = booking.id.clone();
                if let Some(pos) = state.position(&id) {
                    debug!("booking.new for listed booking {id}, replacing");
                    state.view.bookings[pos] = booking;
                    self.notify.send(StoreChange::BookingUpdated(id));
                    return;
                }
                let urgent = booking.is_urgent();
                state.view.bookings.insert(0, booking);
                state.view.pending_count += 1;
                if urgent {
                    state.view.urgent_count += 1;
                }
                info!("new booking {id} (urgent: {urgent})");
                self.notify.send(StoreChange::BookingAdded(id));
            }
            RealtimeEvent::BookingCancelled(r) => {
                if let Some(pos) = state.position(&r.booking_id) {
                    state.view.bookings.remove(pos);
                    self.notify.send(StoreChange::BookingRemoved(r.booking_id.clone()));
                }
                self.optimistic.remove(&r.booking_id);
                state.view.pending_count = state.view.pending_count.saturating_sub(1);
                info!("booking {} cancelled by patient", r.booking_id);
            }
            RealtimeEvent::BookingExpiringSoon(r) => {
                // Counted on every push, even for a booking already counted urgent.
                state.view.urgent_count += 1;
                debug!("booking {} expiring soon", r.booking_id);
            }
        }
        self.notify_counts(&state.view);
    }
}

/// connecting → connected → disconnected → (delay) → connecting … until cancelled.
async fn run_session(store: Arc<BookingsStore>, provider_id: String, token: CancellationToken) {
    loop {
        store.set_connection(ConnectionState::Connecting).await;
        let connected = tokio::select! {
            _ = token.cancelled() => return,
            result = store.connector.connect(&provider_id) => result,
        };
        match connected {
            Ok(mut socket) => {
                info!("realtime connected for provider {provider_id}");
                store.set_connection(ConnectionState::Connected).await;
                match store.pump(socket.as_mut(), &token).await {
                    PumpExit::Cancelled => {
                        socket.close().await;
                        return;
                    }
                    PumpExit::Closed => info!("realtime connection closed by server"),
                    PumpExit::Errored => {}
                }
            }
            Err(e) => warn!("realtime connect for {provider_id} failed: {e}"),
        }

        // The socket is dropped here; only this task can schedule the next attempt.
        store.set_connection(ConnectionState::Disconnected).await;
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(store.reconnect_delay) => {}
        }
        metrics::counter!(observability::REALTIME_RECONNECTS_TOTAL).increment(1);
        info!("realtime reconnecting for provider {provider_id}");
    }
}
