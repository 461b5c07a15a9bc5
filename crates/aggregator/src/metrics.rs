use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "aggregator_fetch_requests_total",
        "Dataset fetch attempts against the provider."
    );
    describe_counter!(
        "aggregator_fetch_errors_total",
        "Failed dataset fetches by error kind."
    );
    describe_histogram!(
        "aggregator_fetch_latency_ms",
        "Dataset fetch latency in milliseconds."
    );
    describe_counter!(
        "aggregator_schema_violations_total",
        "Rows dropped for violating a dataset schema."
    );
    describe_counter!(
        "aggregator_refresh_total",
        "Refresh cycles by outcome (ok, partial, failed)."
    );
    describe_counter!(
        "aggregator_view_carried_over_total",
        "Views retained from the previous cycle after a fetch failure."
    );
    describe_gauge!(
        "aggregator_snapshot_rows",
        "Decoded rows in the current snapshot, per dataset."
    );
    describe_gauge!(
        "aggregator_active_wallets",
        "Active wallets on the latest snapshot day, per balance type."
    );
    describe_gauge!(
        "aggregator_balance_total_usd",
        "USD balance total on the latest snapshot day, per balance type."
    );
}

/// Pushes the latest-day headline numbers as gauges after a refresh, so the
/// Grafana panels track the same views the query surface serves.
pub fn publish_headline_gauges(views: &crate::views::ViewSet) {
    use rust_decimal::prelude::ToPrimitive;
    for bt in common::types::BalanceType::ALL {
        if let Some(count) = views.active_wallets(bt) {
            metrics::gauge!("aggregator_active_wallets", "balance_type" => bt.as_str())
                .set(count as f64);
        }
        if let Some(total) = views.balance_total(bt) {
            metrics::gauge!("aggregator_balance_total_usd", "balance_type" => bt.as_str())
                .set(total.to_f64().unwrap_or_default());
        }
    }
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
