use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::model::*;
use crate::observability;
use crate::store::StoreError;

pub const PROVIDER_HEADER: &str = "x-provider-id";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// The REST backend as seen by the store. The backend is the source of truth;
/// responses are trusted once they parse.
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn fetch_bookings(&self, query: &BookingQuery) -> Result<BookingPage, StoreError>;

    async fn confirm_booking(
        &self,
        provider_id: &str,
        booking_id: &str,
        note: Option<&str>,
        idempotency_key: &str,
    ) -> Result<(), StoreError>;

    async fn decline_booking(
        &self,
        provider_id: &str,
        booking_id: &str,
        reason: &str,
    ) -> Result<(), StoreError>;

    async fn suggest_times(
        &self,
        provider_id: &str,
        booking_id: &str,
        times: &[TimeSlot],
        message: &str,
    ) -> Result<Booking, StoreError>;
}

// ── Wire bodies ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeclineBody {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestTimesBody {
    pub proposed_times: Vec<TimeSlot>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestTimesResponse {
    pub booking: Booking,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Readable message for a non-2xx response.
fn http_error(status: reqwest::StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    StoreError::Http {
        status: status.as_u16(),
        message,
    }
}

/// Path segments are percent-encoded so ids cannot change the route or query.
fn provider_path(provider_id: &str) -> String {
    format!("/bookings/provider/{}", urlencoding::encode(provider_id))
}

fn booking_path(booking_id: &str, action: &str) -> String {
    format!("/bookings/{}/{action}", urlencoding::encode(booking_id))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(http_error(status, &body))
}

fn record<T>(operation: &'static str, started: Instant, result: &Result<T, StoreError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(StoreError::Http { .. }) => "http_error",
        Err(StoreError::Decode(_)) => "decode_error",
        Err(_) => "network_error",
    };
    metrics::counter!(observability::API_REQUESTS_TOTAL, "operation" => operation, "status" => status)
        .increment(1);
    metrics::histogram!(observability::API_REQUEST_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

// ── reqwest implementation ───────────────────────────────────────

pub struct HttpBookingApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBookingApi {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn fetch_bookings(&self, query: &BookingQuery) -> Result<BookingPage, StoreError> {
        let started = Instant::now();
        let result: Result<BookingPage, StoreError> = async {
            let url = self.url(&provider_path(&query.provider_id));
            let limit = query.limit.to_string();
            let offset = query.offset.to_string();
            let response = self
                .client
                .get(&url)
                .header(PROVIDER_HEADER, &query.provider_id)
                .query(&[
                    ("status", query.status.as_str()),
                    ("limit", limit.as_str()),
                    ("offset", offset.as_str()),
                ])
                .send()
                .await?;
            let page: BookingPage = check_status(response).await?.json().await?;
            Ok(page)
        }
        .await;
        record("fetch", started, &result);
        result
    }

    async fn confirm_booking(
        &self,
        provider_id: &str,
        booking_id: &str,
        note: Option<&str>,
        idempotency_key: &str,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        debug!("confirm {booking_id} key={idempotency_key}");
        let result: Result<(), StoreError> = async {
            let response = self
                .client
                .post(self.url(&booking_path(booking_id, "confirm")))
                .header(PROVIDER_HEADER, provider_id)
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(&ConfirmBody {
                    note: note.map(str::to_string),
                })
                .send()
                .await?;
            check_status(response).await?;
            Ok(())
        }
        .await;
        record("confirm", started, &result);
        result
    }

    async fn decline_booking(
        &self,
        provider_id: &str,
        booking_id: &str,
        reason: &str,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        let result: Result<(), StoreError> = async {
            let response = self
                .client
                .post(self.url(&booking_path(booking_id, "decline")))
                .header(PROVIDER_HEADER, provider_id)
                .json(&DeclineBody {
                    reason: reason.to_string(),
                })
                .send()
                .await?;
            check_status(response).await?;
            Ok(())
        }
        .await;
        record("decline", started, &result);
        result
    }

    async fn suggest_times(
        &self,
        provider_id: &str,
        booking_id: &str,
        times: &[TimeSlot],
        message: &str,
    ) -> Result<Booking, StoreError> {
        let started = Instant::now();
        let result: Result<Booking, StoreError> = async {
            let response = self
                .client
                .post(self.url(&booking_path(booking_id, "suggest-times")))
                .header(PROVIDER_HEADER, provider_id)
                .json(&SuggestTimesBody {
                    proposed_times: times.to_vec(),
                    message: message.to_string(),
                })
                .send()
                .await?;
            let body: SuggestTimesResponse = check_status(response).await?.json().await?;
            Ok(body.booking)
        }
        .await;
        record("suggest_times", started, &result);
        result
    }
}
