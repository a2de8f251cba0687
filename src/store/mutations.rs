use chrono::Utc;
use dashmap::DashSet;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::notify::StoreChange;

use super::validate::{validate_decline_reason, validate_suggestion};
use super::{BookingsStore, StoreError};

/// Marks a booking as having an action outstanding; cleared on drop.
pub(super) struct ActionGuard<'a> {
    in_flight: &'a DashSet<String>,
    booking_id: String,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.booking_id);
    }
}

impl BookingsStore {
    pub(super) fn begin_action(&self, booking_id: &str) -> Result<ActionGuard<'_>, StoreError> {
        if !self.in_flight.insert(booking_id.to_string()) {
            return Err(StoreError::ActionInFlight(booking_id.to_string()));
        }
        Ok(ActionGuard {
            in_flight: &self.in_flight,
            booking_id: booking_id.to_string(),
        })
    }

    /// Load a page of bookings. Failures land in the error field only.
    pub async fn fetch_bookings(
        &self,
        provider_id: &str,
        status: BookingStatus,
        limit: u32,
        offset: u32,
    ) {
        self.fetch(BookingQuery {
            provider_id: provider_id.to_string(),
            status,
            limit,
            offset,
        })
        .await
    }

    /// Re-run the last fetch. No-op before the first fetch.
    pub async fn refresh(&self) {
        let last = self.state.read().await.last_query.clone();
        if let Some(query) = last {
            self.fetch(query).await;
        }
    }

    async fn fetch(&self, query: BookingQuery) {
        let had_error = {
            let mut state = self.state.write().await;
            state.view.loading = true;
            state.last_query = Some(query.clone());
            state.view.error.take().is_some()
        };
        if had_error {
            self.notify.send(StoreChange::Error(None));
        }
        self.notify.send(StoreChange::Loading(true));

        let result = self.api.fetch_bookings(&query).await;

        let mut state = self.state.write().await;
        state.view.loading = false;
        match result {
            Ok(page) => {
                debug!(
                    "fetched {} {} bookings (total {}, urgent {})",
                    page.bookings.len(),
                    query.status,
                    page.total_count,
                    page.urgent_count
                );
                state.view.bookings = page.bookings;
                state.view.total_count = page.total_count;
                state.view.urgent_count = page.urgent_count;
                if query.status == BookingStatus::Pending {
                    state.view.pending_count = page.total_count;
                }
                // Snapshots taken against the old list no longer apply.
                self.optimistic.clear();
                self.notify.send(StoreChange::Fetched {
                    count: state.view.bookings.len(),
                });
                self.notify_counts(&state.view);
            }
            Err(e) => {
                warn!("fetch bookings for {} failed: {e}", query.provider_id);
                let message = e.to_string();
                state.view.error = Some(message.clone());
                self.notify.send(StoreChange::Error(Some(message)));
            }
        }
        drop(state);
        self.notify.send(StoreChange::Loading(false));
    }

    /// Confirm a booking. The caller owns any optimistic state and rolls it
    /// back when this returns an error.
    pub async fn confirm_booking(&self, booking_id: &str, note: Option<&str>) -> Result<(), StoreError> {
        let _guard = self.begin_action(booking_id)?;
        self.confirm_guarded(booking_id, note).await
    }

    /// Confirm with the optimistic write and the rollback handled here.
    pub async fn confirm_booking_optimistic(
        &self,
        booking_id: &str,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        let _guard = self.begin_action(booking_id)?;
        if let Some(mut booking) = self.booking(booking_id).await {
            booking.status = BookingStatus::Confirmed;
            booking.confirmed_at = Some(Utc::now());
            booking.confirmation_note = note.map(str::to_string);
            self.update_booking_optimistic(booking).await;
        }
        let result = self.confirm_guarded(booking_id, note).await;
        if result.is_err() {
            self.rollback_optimistic_update(booking_id).await;
        }
        result
    }

    async fn confirm_guarded(&self, booking_id: &str, note: Option<&str>) -> Result<(), StoreError> {
        self.clear_error().await;
        // Fresh key per attempt; the backend de-duplicates retries of one attempt.
        let idempotency_key = Ulid::new().to_string();
        match self
            .api
            .confirm_booking(&self.provider_id, booking_id, note, &idempotency_key)
            .await
        {
            Ok(()) => {
                info!("confirmed booking {booking_id}");
                self.remove_settled(booking_id).await;
                Ok(())
            }
            Err(e) => {
                warn!("confirm booking {booking_id} failed: {e}");
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    pub async fn decline_booking(&self, booking_id: &str, reason: &str) -> Result<(), StoreError> {
        let reason = match validate_decline_reason(reason) {
            Ok(r) => r,
            Err(v) => {
                let e = StoreError::from(v);
                self.record_error(&e).await;
                return Err(e);
            }
        };
        let _guard = self.begin_action(booking_id)?;
        self.clear_error().await;
        match self
            .api
            .decline_booking(&self.provider_id, booking_id, reason)
            .await
        {
            Ok(()) => {
                info!("declined booking {booking_id}");
                self.remove_settled(booking_id).await;
                Ok(())
            }
            Err(e) => {
                warn!("decline booking {booking_id} failed: {e}");
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// Propose 1–3 alternative times. On success the server's copy of the
    /// booking replaces the local one.
    pub async fn suggest_times(
        &self,
        booking_id: &str,
        times: &[TimeSlot],
        message: &str,
    ) -> Result<Booking, StoreError> {
        if let Err(v) = validate_suggestion(times, message, Utc::now()) {
            let e = StoreError::from(v);
            self.record_error(&e).await;
            return Err(e);
        }
        let _guard = self.begin_action(booking_id)?;
        self.clear_error().await;
        match self
            .api
            .suggest_times(&self.provider_id, booking_id, times, message.trim())
            .await
        {
            Ok(updated) => {
                info!("suggested {} times for booking {booking_id}", times.len());
                let mut state = self.state.write().await;
                if let Some(pos) = state.position(booking_id) {
                    state.view.bookings[pos] = updated.clone();
                }
                self.optimistic.remove(booking_id);
                self.notify.send(StoreChange::BookingUpdated(booking_id.to_string()));
                Ok(updated)
            }
            Err(e) => {
                warn!("suggest times for {booking_id} failed: {e}");
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// Drop a confirmed/declined booking from the pending view.
    async fn remove_settled(&self, booking_id: &str) {
        let mut state = self.state.write().await;
        let removed = state
            .position(booking_id)
            .map(|pos| state.view.bookings.remove(pos));
        state.view.pending_count = state.view.pending_count.saturating_sub(1);
        if removed.as_ref().is_some_and(|b| b.is_urgent()) {
            state.view.urgent_count = state.view.urgent_count.saturating_sub(1);
        }
        self.optimistic.remove(booking_id);
        if removed.is_some() {
            self.notify.send(StoreChange::BookingRemoved(booking_id.to_string()));
        }
        self.notify_counts(&state.view);
    }
}
