use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_live_connections",
        "Live handles currently held by the connection registry",
    )
    .expect("failed to create realtime_live_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_live_connections");
    gauge
});

pub static ONLINE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_online_users",
        "Users with at least one live handle",
    )
    .expect("failed to create realtime_online_users");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_online_users");
    gauge
});

pub static MESSAGES_RELAYED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_messages_relayed_total",
            "Chat relay calls by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create realtime_messages_relayed_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_messages_relayed_total");
    counter
});

pub static DELIVERY_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_delivery_failures_total",
            "Per-handle push failures",
        ),
        &["reason"],
    )
    .expect("failed to create realtime_delivery_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_delivery_failures_total");
    counter
});

pub static HEARTBEAT_REAPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "realtime_heartbeat_reaped_total",
        "Connections closed because they stopped answering probes",
    )
    .expect("failed to create realtime_heartbeat_reaped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_heartbeat_reaped_total");
    counter
});

pub static UPGRADE_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_upgrade_rejections_total",
            "Refused upgrade requests by reason",
        ),
        &["reason"],
    )
    .expect("failed to create realtime_upgrade_rejections_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_upgrade_rejections_total");
    counter
});

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
