use std::net::SocketAddr;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref BROADCASTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cp_broadcasts_total", "Broadcast cycles run per cluster"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref CONFIG_PUSHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cp_config_pushes_total", "Payloads written to data-plane nodes"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref PUSH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cp_push_failures_total", "Pushes that failed or were skipped on error"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref HASH_MATCH_SKIPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cp_hash_match_skips_total", "Pushes skipped because the node already runs the hash"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref CONNECTED_NODES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cp_connected_nodes", "Data-plane nodes currently connected"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref RELOAD_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("cp_reload_duration_ms", "Snapshot reload latency in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).unwrap_or_default()),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BROADCASTS_TOTAL.clone()),
        Box::new(CONFIG_PUSHES_TOTAL.clone()),
        Box::new(PUSH_FAILURES_TOTAL.clone()),
        Box::new(HASH_MATCH_SKIPS_TOTAL.clone()),
        Box::new(CONNECTED_NODES.clone()),
        Box::new(RELOAD_DURATION_MS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {:?}", e);
        }
    }
}

/// Serves `/metrics` on `addr` until `cancel` fires
pub async fn start_server(
    addr: SocketAddr,
    cancel: CancellationToken,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!(%addr, "metrics server listening");
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(addr, async move { cancel.cancelled().await });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_registry(&REGISTRY))
}

pub(crate) fn encode_registry(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}

#[cfg(test)]
mod metrics_test;
