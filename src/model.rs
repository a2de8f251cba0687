use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// UTC instant, the only time type on the wire.
pub type Timestamp = DateTime<Utc>;

/// A pending booking becomes urgent this many hours before it expires.
pub const URGENT_WINDOW_HOURS: i64 = 6;

const SECS_PER_HOUR: f64 = 3_600.0;

/// Half-open slot `[start, end)` proposed to a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeSlot {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Declined,
    Expired,
    Cancelled,
    Completed,
    NoShow,
    #[serde(other)]
    Unknown,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Declined => "declined",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
            BookingStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    DepositPaid,
    Paid,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    pub category: String,
    pub duration_minutes: u32,
    pub price: f64,
}

/// Canonical booking shape shared by REST responses and realtime pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub patient: Patient,
    #[serde(default)]
    pub is_returning_patient: bool,
    #[serde(default)]
    pub visit_count: u32,
    pub service: Service,
    pub requested_start: Timestamp,
    pub requested_end: Timestamp,
    pub provider_timezone: String,
    pub patient_timezone: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub patient_note: Option<String>,
    pub total_amount: f64,
    pub deposit_amount: f64,
    pub payment_status: PaymentStatus,
    pub expires_at: Timestamp,
    #[serde(default)]
    pub confirmed_at: Option<Timestamp>,
    #[serde(default)]
    pub confirmation_note: Option<String>,
    #[serde(default)]
    pub declined_at: Option<Timestamp>,
    #[serde(default)]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub proposed_times: Option<Vec<TimeSlot>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Booking {
    /// Fractional hours from `now` until expiry; negative once expired.
    pub fn hours_until_expiry_at(&self, now: Timestamp) -> f64 {
        let remaining = self.expires_at - now;
        (remaining.num_seconds() as f64 + remaining.subsec_nanos() as f64 / 1e9) / SECS_PER_HOUR
    }

    /// Urgent iff `0 <= hours_until_expiry < 6`.
    pub fn is_urgent_at(&self, now: Timestamp) -> bool {
        let remaining = self.expires_at - now;
        remaining >= TimeDelta::zero() && remaining < TimeDelta::hours(URGENT_WINDOW_HOURS)
    }

    pub fn hours_until_expiry(&self) -> f64 {
        self.hours_until_expiry_at(Utc::now())
    }

    pub fn is_urgent(&self) -> bool {
        self.is_urgent_at(Utc::now())
    }
}

/// One page of `GET /bookings/provider/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total_count: u64,
    pub urgent_count: u64,
}

/// Filter + paging for a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingQuery {
    pub provider_id: String,
    pub status: BookingStatus,
    pub limit: u32,
    pub offset: u32,
}

impl BookingQuery {
    pub fn pending(provider_id: impl Into<String>, limit: u32) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: BookingStatus::Pending,
            limit,
            offset: 0,
        }
    }
}
