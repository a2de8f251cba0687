use std::net::SocketAddr;

// ── REST ────────────────────────────────────────────────────────

/// Counter: backend requests. Labels: operation, status.
pub const API_REQUESTS_TOTAL: &str = "bookdesk_api_requests_total";

/// Histogram: backend request latency in seconds. Labels: operation.
pub const API_REQUEST_DURATION_SECONDS: &str = "bookdesk_api_request_duration_seconds";

// ── Realtime ────────────────────────────────────────────────────

/// Counter: realtime events applied. Labels: event.
pub const REALTIME_EVENTS_TOTAL: &str = "bookdesk_realtime_events_total";

/// Counter: realtime messages dropped because they did not parse.
pub const REALTIME_MALFORMED_TOTAL: &str = "bookdesk_realtime_malformed_total";

/// Counter: reconnect attempts after a close or failed connect.
pub const REALTIME_RECONNECTS_TOTAL: &str = "bookdesk_realtime_reconnects_total";

/// Gauge: 1 while the realtime connection is open.
pub const REALTIME_CONNECTED: &str = "bookdesk_realtime_connected";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
