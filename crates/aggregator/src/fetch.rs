//! Dataset-fetch seams. The refresh job depends on these traits, not on the
//! concrete HTTP client, so tests can drive it with fakes.

use std::time::Instant;

use serde_json::Value;

use common::error::{classify_fetch_failure, FetchFailure};
use common::flipside::FlipsideClient;

pub trait BalancesFetcher {
    fn fetch_balances(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, FetchFailure>> + Send;
}

pub trait PricesFetcher {
    fn fetch_prices(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, FetchFailure>> + Send;
}

/// The provider-backed fetcher: one client, one saved-query id per dataset.
pub struct ProviderDatasets {
    client: FlipsideClient,
    balances_id: String,
    prices_id: String,
}

impl ProviderDatasets {
    pub fn new(client: FlipsideClient, balances_id: &str, prices_id: &str) -> Self {
        Self {
            client,
            balances_id: balances_id.to_string(),
            prices_id: prices_id.to_string(),
        }
    }
}

async fn fetch_instrumented(
    client: &FlipsideClient,
    dataset: &'static str,
    dataset_id: &str,
) -> Result<Vec<Value>, FetchFailure> {
    let start = Instant::now();
    let res = client.fetch_rows(dataset_id).await;
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("aggregator_fetch_latency_ms", "dataset" => dataset).record(ms);
    match res {
        Ok(rows) => {
            metrics::counter!("aggregator_fetch_requests_total", "dataset" => dataset, "status" => "ok")
                .increment(1);
            Ok(rows)
        }
        Err(e) => {
            metrics::counter!("aggregator_fetch_requests_total", "dataset" => dataset, "status" => "error")
                .increment(1);
            metrics::counter!(
                "aggregator_fetch_errors_total",
                "dataset" => dataset,
                "kind" => classify_fetch_failure(&e).as_str()
            )
            .increment(1);
            Err(e)
        }
    }
}

impl BalancesFetcher for ProviderDatasets {
    async fn fetch_balances(&self) -> Result<Vec<Value>, FetchFailure> {
        fetch_instrumented(&self.client, "balances", &self.balances_id).await
    }
}

impl PricesFetcher for ProviderDatasets {
    async fn fetch_prices(&self) -> Result<Vec<Value>, FetchFailure> {
        fetch_instrumented(&self.client, "prices", &self.prices_id).await
    }
}
