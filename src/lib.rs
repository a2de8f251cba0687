pub mod api;
pub mod config;
pub mod model;
pub mod notify;
pub mod observability;
pub mod realtime;
pub mod store;

pub use api::{BookingApi, HttpBookingApi};
pub use config::Config;
pub use model::{Booking, BookingStatus, TimeSlot};
pub use notify::StoreChange;
pub use realtime::{RealtimeConnector, RealtimeEvent, WsConnector};
pub use store::{BookingsStore, ConnectionState, Snapshot, StoreError, ValidationError};
