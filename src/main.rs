use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use bookdesk::model::BookingStatus;
use bookdesk::{BookingsStore, Config, StoreChange};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    bookdesk::observability::init(config.metrics_port)?;

    let provider_id = std::env::var("BOOKDESK_PROVIDER_ID")
        .map_err(|_| "BOOKDESK_PROVIDER_ID must be set")?;

    info!("bookdesk mirroring bookings for provider {provider_id}");
    info!("  api: {}", config.api_url);
    info!("  realtime: {}", config.ws_url);
    info!("  reconnect_delay: {:?}", config.reconnect_delay);

    let store = BookingsStore::from_config(provider_id.clone(), &config)?;
    let mut changes = store.subscribe();

    store
        .fetch_bookings(&provider_id, BookingStatus::Pending, config.page_size, 0)
        .await;
    log_summary(&store).await;
    store.connect_websocket(&provider_id).await;

    // Graceful shutdown: stop on SIGTERM/ctrl-c, close the realtime session
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(_) => {
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            change = changes.recv() => {
                match change {
                    Ok(StoreChange::Error(Some(message))) => tracing::warn!("store error: {message}"),
                    Ok(StoreChange::Connection(state)) => info!("realtime: {state:?}"),
                    Ok(StoreChange::BookingAdded(_) | StoreChange::BookingRemoved(_) | StoreChange::Fetched { .. }) => {
                        log_summary(&store).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("missed {n} store changes, refreshing");
                        store.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    store.disconnect_websocket().await;
    info!("bookdesk stopped");
    Ok(())
}

async fn log_summary(store: &BookingsStore) {
    let snapshot = store.snapshot().await;
    info!(
        "pending: {} (urgent: {}), listed: {}",
        snapshot.pending_count,
        snapshot.urgent_count,
        snapshot.bookings.len()
    );
    for booking in snapshot.bookings.iter().filter(|b| b.is_urgent()) {
        info!(
            "  urgent {} {}, expires in {:.1}h",
            booking.id,
            booking.patient.name,
            booking.hours_until_expiry()
        );
    }
}
