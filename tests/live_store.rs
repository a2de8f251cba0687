use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_test::{assert_err, assert_ok};

use bookdesk::model::TimeSlot;
use bookdesk::{Booking, BookingStatus, BookingsStore, Config, ConnectionState, StoreError};

// ── Test backend ─────────────────────────────────────────────

#[derive(Default)]
struct Backend {
    bookings: Mutex<Vec<Booking>>,
    confirm_keys: Mutex<Vec<String>>,
    provider_headers: Mutex<Vec<String>>,
    fail_confirm: AtomicBool,
    /// One feed per accepted socket; `None` asks the server to close it.
    sockets: Mutex<Vec<mpsc::UnboundedSender<Option<String>>>>,
    ws_queries: Mutex<Vec<HashMap<String, String>>>,
}

type Shared = Arc<Backend>;

async fn note_provider(backend: &Backend, headers: &HeaderMap) {
    if let Some(p) = headers.get("x-provider-id").and_then(|v| v.to_str().ok()) {
        backend.provider_headers.lock().await.push(p.to_string());
    }
}

async fn list(
    State(backend): State<Shared>,
    Path(_provider_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    note_provider(&backend, &headers).await;
    let status = query.get("status").cloned().unwrap_or_default();
    let bookings: Vec<Booking> = backend
        .bookings
        .lock()
        .await
        .iter()
        .filter(|b| b.status.as_str() == status)
        .cloned()
        .collect();
    let urgent = bookings.iter().filter(|b| b.is_urgent()).count();
    Json(json!({
        "bookings": bookings,
        "totalCount": bookings.len(),
        "urgentCount": urgent,
    }))
}

async fn confirm(
    State(backend): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    note_provider(&backend, &headers).await;
    if let Some(key) = headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()) {
        backend.confirm_keys.lock().await.push(key.to_string());
    }
    if backend.fail_confirm.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "Confirmation service unavailable" })),
        )
            .into_response();
    }
    set_status(&backend, &id, BookingStatus::Confirmed).await
}

async fn decline(
    State(backend): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if body["reason"].as_str().unwrap_or_default().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    set_status(&backend, &id, BookingStatus::Declined).await
}

async fn set_status(backend: &Backend, id: &str, status: BookingStatus) -> Response {
    let mut bookings = backend.bookings.lock().await;
    match bookings.iter_mut().find(|b| b.id == id) {
        Some(b) => {
            b.status = status;
            StatusCode::OK.into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Booking not found" }))).into_response(),
    }
}

async fn suggest(
    State(backend): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let times: Vec<TimeSlot> = match serde_json::from_value(body["proposedTimes"].clone()) {
        Ok(t) => t,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let mut bookings = backend.bookings.lock().await;
    match bookings.iter_mut().find(|b| b.id == id) {
        Some(b) => {
            b.proposed_times = Some(times);
            b.updated_at = Utc::now();
            Json(json!({ "booking": b })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws(
    State(backend): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    backend.ws_queries.lock().await.push(query);
    upgrade.on_upgrade(move |socket| serve_socket(socket, backend))
}

async fn serve_socket(mut socket: WebSocket, backend: Shared) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    backend.sockets.lock().await.push(tx);
    while let Some(next) = rx.recv().await {
        match next {
            Some(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            None => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn start_backend(seed: Vec<Booking>) -> (SocketAddr, Shared) {
    let backend: Shared = Arc::new(Backend::default());
    *backend.bookings.lock().await = seed;

    let app = Router::new()
        .route("/api/bookings/provider/:provider_id", get(list))
        .route("/api/bookings/:id/confirm", post(confirm))
        .route("/api/bookings/:id/decline", post(decline))
        .route("/api/bookings/:id/suggest-times", post(suggest))
        .route("/ws", get(ws))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, backend)
}

fn store_for(addr: SocketAddr) -> Arc<BookingsStore> {
    let mut config = Config::new(format!("http://{addr}/api"));
    config.reconnect_delay = Duration::from_millis(100);
    BookingsStore::from_config("prov_42", &config).unwrap()
}

fn booking(id: &str, expires_in_hours: i64, status: &str) -> Booking {
    let now = Utc::now();
    let expires = now + chrono::Duration::hours(expires_in_hours);
    let start = expires + chrono::Duration::hours(24);
    serde_json::from_value(json!({
        "id": id,
        "patient": { "name": "Noor Haddad", "email": "noor@example.com", "phone": "+34 600 000 000" },
        "isReturningPatient": true,
        "visitCount": 4,
        "service": { "name": "Follow-up", "category": "dermatology", "durationMinutes": 30, "price": 65.0 },
        "requestedStart": start,
        "requestedEnd": start + chrono::Duration::minutes(30),
        "providerTimezone": "Europe/Madrid",
        "patientTimezone": "Europe/Madrid",
        "status": status,
        "patientNote": "Rash came back",
        "totalAmount": 65.0,
        "depositAmount": 15.0,
        "paymentStatus": "deposit_paid",
        "expiresAt": expires,
        "createdAt": now,
        "updatedAt": now,
    }))
    .unwrap()
}

async fn wait_until<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn push(backend: &Backend, socket: usize, text: Option<String>) {
    backend.sockets.lock().await[socket].send(text).unwrap();
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn actions_round_trip_through_http() {
    let (addr, backend) = start_backend(vec![
        booking("a", 2, "pending"),
        booking("b", 30, "pending"),
        booking("c", 30, "pending"),
        booking("old", 30, "confirmed"),
    ])
    .await;
    let store = store_for(addr);

    store.fetch_bookings("prov_42", BookingStatus::Pending, 20, 0).await;
    let snap = store.snapshot().await;
    assert_eq!(snap.error, None);
    assert_eq!(snap.bookings.len(), 3);
    assert_eq!(snap.pending_count, 3);
    assert_eq!(snap.urgent_count, 1);

    assert_ok!(store.confirm_booking("a", Some("Booked you in")).await);
    assert_ok!(store.decline_booking("b", "Not covered by my practice").await);

    let slot_start = Utc::now() + chrono::Duration::days(3);
    let slots = vec![TimeSlot::new(slot_start, slot_start + chrono::Duration::minutes(30))];
    let updated = store
        .suggest_times("c", &slots, "Could you do Thursday instead?")
        .await
        .unwrap();
    assert_eq!(updated.proposed_times, Some(slots.clone()));

    let snap = store.snapshot().await;
    assert_eq!(snap.bookings.len(), 1);
    assert_eq!(snap.bookings[0].id, "c");
    assert_eq!(snap.bookings[0].proposed_times, Some(slots));
    assert_eq!(snap.pending_count, 1);
    assert_eq!(snap.urgent_count, 0);

    let keys = backend.confirm_keys.lock().await.clone();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].parse::<ulid::Ulid>().is_ok());
    assert!(backend.provider_headers.lock().await.iter().all(|p| p == "prov_42"));

    let server = backend.bookings.lock().await.clone();
    assert_eq!(server[0].status, BookingStatus::Confirmed);
    assert_eq!(server[1].status, BookingStatus::Declined);
}

#[tokio::test]
async fn failed_confirm_surfaces_server_message() {
    let (addr, backend) = start_backend(vec![booking("a", 30, "pending")]).await;
    backend.fail_confirm.store(true, Ordering::SeqCst);
    let store = store_for(addr);
    store.fetch_bookings("prov_42", BookingStatus::Pending, 20, 0).await;

    let err = assert_err!(store.confirm_booking_optimistic("a", None).await);
    assert_eq!(
        err,
        StoreError::Http {
            status: 503,
            message: "Confirmation service unavailable".into()
        }
    );
    assert_eq!(store.error().await.as_deref(), Some("Confirmation service unavailable"));
    let listed = store.booking("a").await.unwrap();
    assert_eq!(listed.status, BookingStatus::Pending); // rolled back

    backend.fail_confirm.store(false, Ordering::SeqCst);
    assert_ok!(store.confirm_booking("a", None).await);
    let keys = backend.confirm_keys.lock().await.clone();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn unknown_booking_reports_error_body() {
    let (addr, _backend) = start_backend(vec![]).await;
    let store = store_for(addr);
    let err = store.decline_booking("nope", "Duplicate request").await.unwrap_err();
    assert_eq!(err.to_string(), "Booking not found");
}

#[tokio::test]
async fn realtime_push_and_reconnect() {
    let (addr, backend) = start_backend(vec![]).await;
    let store = store_for(addr);
    store.fetch_bookings("prov_42", BookingStatus::Pending, 20, 0).await;

    store.connect_websocket("prov_42").await;
    let (b, s) = (&*backend, &*store);
    wait_until("first socket", move || async move { b.sockets.lock().await.len() == 1 }).await;
    wait_until("connected", move || async move { s.is_connected().await }).await;

    let q = backend.ws_queries.lock().await[0].clone();
    assert_eq!(q.get("userId").map(String::as_str), Some("prov_42"));
    assert_eq!(q.get("type").map(String::as_str), Some("provider"));

    let fresh = booking("n1", 1, "pending");
    push(&backend, 0, Some(json!({ "type": "booking.new", "data": fresh }).to_string())).await;
    push(&backend, 0, Some("garbage".into())).await;
    wait_until("new booking", move || async move { s.pending_count().await == 1 }).await;
    assert_eq!(store.urgent_count().await, 1);
    assert_eq!(store.booking("n1").await, Some(fresh));

    // server hangs up; the store comes back on its own
    push(&backend, 0, None).await;
    wait_until("second socket", move || async move { b.sockets.lock().await.len() == 2 }).await;
    wait_until("reconnected", move || async move {
        s.connection_state().await == ConnectionState::Connected
    })
    .await;

    push(
        &backend,
        1,
        Some(r#"{"type":"booking.cancelled","data":{"bookingId":"n1"}}"#.into()),
    )
    .await;
    wait_until("cancel applied", move || async move { s.bookings().await.is_empty() }).await;
    assert_eq!(store.pending_count().await, 0);

    store.disconnect_websocket().await;
    assert!(!store.is_connected().await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.sockets.lock().await.len(), 2);
}

#[tokio::test]
async fn reserved_characters_in_ids_reach_the_backend_intact() {
    let odd_booking = "bk 7/a&b?c";
    let odd_provider = "prov 42&type=patient";
    let (addr, backend) = start_backend(vec![booking(odd_booking, 30, "pending")]).await;
    let store = BookingsStore::from_config(odd_provider, &Config::new(format!("http://{addr}/api"))).unwrap();

    store.fetch_bookings(odd_provider, BookingStatus::Pending, 20, 0).await;
    assert_eq!(store.error().await, None);
    assert_eq!(store.pending_count().await, 1);

    assert_ok!(store.confirm_booking(odd_booking, None).await);
    assert_eq!(backend.bookings.lock().await[0].status, BookingStatus::Confirmed);

    store.connect_websocket(odd_provider).await;
    let b = &*backend;
    wait_until("socket", move || async move { b.ws_queries.lock().await.len() == 1 }).await;
    let q = backend.ws_queries.lock().await[0].clone();
    assert_eq!(q.get("userId").map(String::as_str), Some(odd_provider));
    assert_eq!(q.get("type").map(String::as_str), Some("provider"));
    store.disconnect_websocket().await;
}
