use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::model::Booking;
use crate::notify::StoreChange;

use super::BookingsStore;

/// The value the list held before the first optimistic write, and the value
/// it holds now.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticSlot {
    pub committed: Booking,
    pub pending: Booking,
}

impl BookingsStore {
    /// Apply `booking` to the list ahead of the server. Returns false (and
    /// changes nothing) when the booking is not in the list.
    pub async fn update_booking_optimistic(&self, booking: Booking) -> bool {
        let mut state = self.state.write().await;
        let Some(pos) = state.position(&booking.id) else {
            debug!("optimistic update for unknown booking {}", booking.id);
            return false;
        };
        let id = booking.id.clone();
        let previous = std::mem::replace(&mut state.view.bookings[pos], booking.clone());
        match self.optimistic.entry(id.clone()) {
            // Stacked writes keep the first committed value.
            Entry::Occupied(mut slot) => slot.get_mut().pending = booking,
            Entry::Vacant(slot) => {
                slot.insert(OptimisticSlot {
                    committed: previous,
                    pending: booking,
                });
            }
        }
        self.notify.send(StoreChange::BookingUpdated(id));
        true
    }

    /// Restore the committed value. No-op without a slot.
    pub async fn rollback_optimistic_update(&self, booking_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some((_, slot)) = self.optimistic.remove(booking_id) else {
            return false;
        };
        let Some(pos) = state.position(booking_id) else {
            return false;
        };
        state.view.bookings[pos] = slot.committed;
        debug!("rolled back optimistic update for {booking_id}");
        self.notify.send(StoreChange::BookingUpdated(booking_id.to_string()));
        true
    }

    /// Accept the optimistic value as committed.
    pub fn commit_optimistic_update(&self, booking_id: &str) -> bool {
        self.optimistic.remove(booking_id).is_some()
    }

    pub fn optimistic_slot(&self, booking_id: &str) -> Option<OptimisticSlot> {
        self.optimistic.get(booking_id).map(|e| e.value().clone())
    }
}
