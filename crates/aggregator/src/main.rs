use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use common::types::{EntityKind, RankMetric};

mod aggregate;
mod decode;
mod fetch;
mod metrics;
mod refresh;
mod scheduler;
mod valuation;
mod views;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("aggregator", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    tracing::info!("balance aggregator starting");

    metrics::install_prometheus(config.observability.prometheus_port)?;
    metrics::describe();

    let client = common::flipside::FlipsideClient::new_with_settings(
        &config.provider.base_url,
        Duration::from_secs(config.provider.request_timeout_secs),
        config.provider.max_retries,
        Duration::from_millis(config.provider.backoff_base_ms),
    );
    let provider = Arc::new(fetch::ProviderDatasets::new(
        client,
        &config.datasets.balances,
        &config.datasets.prices,
    ));
    let store = Arc::new(views::SnapshotStore::new());
    let cfg = Arc::new(config);

    let (refresh_tx, mut refresh_rx) = tokio::sync::mpsc::channel::<()>(4);
    let _scheduler = scheduler::start(vec![scheduler::JobSpec {
        name: "refresh".to_string(),
        interval: Duration::from_secs(cfg.refresh.interval_secs),
        tick: refresh_tx.clone(),
    }]);

    // Kick off the first refresh immediately; the scheduler takes over after.
    let _ = refresh_tx.send(()).await;

    while refresh_rx.recv().await.is_some() {
        let summary =
            refresh::run_refresh_once(provider.as_ref(), store.as_ref(), &cfg.analytics.focus_denom)
                .await;

        let current = store.load();
        metrics::publish_headline_gauges(&current);
        tracing::info!(
            latest_day = ?current.latest_date(),
            balances_built_at = %current.quantity.built_at(),
            prices_built_at = %current.usd.built_at(),
            "snapshot swapped"
        );

        if summary.fully_refreshed() {
            let top_wallets =
                current.top_k(EntityKind::Wallet, RankMetric::BalanceUsd, None, cfg.rankings.top_k);
            if let Some(leader) = top_wallets.first() {
                tracing::info!(
                    wallet = %leader.entity_id,
                    balance_usd = %leader.value,
                    of = top_wallets.len(),
                    "top wallet by USD balance"
                );
            }
            let focus = current.focus_summary();
            tracing::info!(
                focus_denom = %cfg.analytics.focus_denom,
                wallets = focus.wallet_count,
                total_quantity = %focus.total_quantity,
                "focus token summary"
            );
        }
    }

    Ok(())
}
