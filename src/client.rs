use anyhow::{Result, anyhow};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use indicatif::{MultiProgress, ProgressBar};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, info_span};

use crate::config::{ClientConfig, load_config};
use crate::error::RequestError;
use crate::frame::TimeSeriesFrame;
use crate::lifecycle::{DEFAULT_POLL_INTERVAL, Lifecycle, spinner};
use crate::product::{Dataset, Product, TimeSeries, Tmy};
use crate::request::{DataRequest, TimeSeriesRequest, TmyRequest};
use crate::transport::{HttpTransport, Transport};

/// Outcome of one named request.
pub type Outcome = std::result::Result<Dataset, RequestError>;

/// Coordinates many named requests against one API.
///
/// Every request advances through submit, poll and download concurrently with the
/// others; a slow or failing job never holds up the rest.
pub struct Client<P: Product> {
    product: P,
    dest_folder: PathBuf,
    requests: Vec<(String, Value)>,
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
    progress: bool,
    datasets: BTreeMap<String, Dataset>,
}

pub type TimeSeriesClient = Client<TimeSeries>;
pub type TmyClient = Client<Tmy>;

/// Summary of [`Client::retrieve_all_data`].
#[derive(Debug, Default)]
pub struct RetrievalReport {
    /// Names in completion order.
    pub succeeded: Vec<String>,
    pub failed: BTreeMap<String, RequestError>,
}

impl RetrievalReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<P: Product + Default> Client<P> {
    /// Creates a client using environment variables and/or `.sgapirc`.
    ///
    /// This is equivalent to `Client::new(dest_folder, None, None, None)`.
    pub fn from_env(dest_folder: impl Into<PathBuf>) -> Result<Self> {
        Self::new(dest_folder, None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`key` arguments
    /// - environment variables `SGAPI_TS_URL` / `SGAPI_TS_KEY` (`SGAPI_TMY_*` for TMY)
    /// - config file from `SGAPI_RC` or `.sgapirc`
    ///
    /// The URL falls back to the public endpoint of the API.
    pub fn new(
        dest_folder: impl Into<PathBuf>,
        url: Option<String>,
        key: Option<String>,
        verify: Option<bool>,
    ) -> Result<Self> {
        let cfg = load_config(P::TAG, P::DEFAULT_URL, url, key, verify)?;
        Self::with_config(P::default(), dest_folder, &cfg)
    }
}

impl<P: Product> Client<P> {
    pub fn with_config(
        product: P,
        dest_folder: impl Into<PathBuf>,
        cfg: &ClientConfig,
    ) -> Result<Self> {
        let transport = HttpTransport::new(cfg)?;
        Ok(Self::with_transport(product, dest_folder, Arc::new(transport)))
    }

    /// Uses any [`Transport`], e.g. a proxy or an in-memory fake.
    pub fn with_transport(
        product: P,
        dest_folder: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            product,
            dest_folder: dest_folder.into(),
            requests: Vec::new(),
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: true,
            datasets: BTreeMap::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn product(&self) -> &P {
        &self.product
    }

    pub fn dest_folder(&self) -> &Path {
        &self.dest_folder
    }

    /// Registers a request under its site name, replacing any request of that name.
    pub fn add_request(&mut self, request: P::Request) {
        let name = request.name().to_string();
        self.add_raw_request(name, request.to_body());
    }

    /// Registers a ready-made JSON body under `name`.
    pub fn add_raw_request(&mut self, name: impl Into<String>, body: Value) {
        let name = name.into();
        match self.requests.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = body,
            None => self.requests.push((name, body)),
        }
    }

    pub fn requests(&self) -> &[(String, Value)] {
        &self.requests
    }

    /// Starts every registered request and yields each one as soon as it resolves.
    ///
    /// With `save`, finished datasets are written below the destination folder before
    /// they are yielded.
    pub fn retrieve_data(&self, save: bool) -> impl Stream<Item = (String, Outcome)> + '_ {
        let multi = self.progress.then(MultiProgress::new);
        let dest = save.then_some(self.dest_folder.as_path());
        info!(count = self.requests.len(), api = P::TAG, "retrieving data");

        self.requests
            .iter()
            .map(|(name, body)| {
                let mut body = body.clone();
                self.product.prepare(&mut body);
                let pb = match &multi {
                    Some(multi) => multi.add(spinner(name)),
                    None => ProgressBar::hidden(),
                };
                let lifecycle = Lifecycle {
                    transport: self.transport.as_ref(),
                    product: &self.product,
                    poll_interval: self.poll_interval,
                    dest,
                };
                let span = info_span!("request", name = %name);
                async move {
                    let outcome = lifecycle.run(name, &body, &pb).await;
                    (name.clone(), outcome)
                }
                .instrument(span)
            })
            .collect::<FuturesUnordered<_>>()
    }

    /// Runs every registered request to completion and keeps the successful datasets.
    pub async fn retrieve_all_data(&mut self, save: bool) -> RetrievalReport {
        let outcomes: Vec<(String, Outcome)> = self.retrieve_data(save).collect().await;

        let mut report = RetrievalReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(dataset) => {
                    report.succeeded.push(name.clone());
                    self.datasets.insert(name, dataset);
                }
                Err(e) => {
                    self.datasets.remove(&name);
                    report.failed.insert(name, e);
                }
            }
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "retrieval finished"
        );
        report
    }

    pub fn datasets(&self) -> &BTreeMap<String, Dataset> {
        &self.datasets
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn into_datasets(self) -> BTreeMap<String, Dataset> {
        self.datasets
    }
}

impl Client<Tmy> {
    /// Parse the JSON member of every archive; adds SOLARGIS_JSON to each request.
    pub fn with_dataframes(mut self, dataframes: bool) -> Self {
        self.product.dataframes = dataframes;
        self
    }
}

async fn single_frame<P: Product>(
    mut client: Client<P>,
    name: String,
) -> Result<TimeSeriesFrame> {
    let mut report = client.retrieve_all_data(false).await;
    if let Some(e) = report.failed.remove(&name) {
        return Err(anyhow!("{}: {}", name, e));
    }
    client
        .datasets
        .remove(&name)
        .and_then(|d| d.frame)
        .ok_or_else(|| anyhow!("{}: payload contained no SOLARGIS_JSON data", name))
}

/// Fetches one time series without saving anything to disk.
///
/// ```no_run
/// use sgapi::{TimeSeriesRequest, historical_timeseries};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let req = TimeSeriesRequest::new("Linz", 48.275231, 14.26934)
///     .time_step("P1Y")
///     .parameters(["GHI", "DNI", "DIF", "TEMP"]);
/// let frame = historical_timeseries(Some("<token>".into()), req).await?;
/// println!("{} rows", frame.len());
/// # Ok(())
/// # }
/// ```
pub async fn historical_timeseries(
    token: Option<String>,
    request: TimeSeriesRequest,
) -> Result<TimeSeriesFrame> {
    let mut client = TimeSeriesClient::new(".", None, token, None)?;
    let name = request.site_name.clone();
    client.add_request(request);
    single_frame(client, name).await
}

/// Fetches one TMY dataset without saving anything to disk.
pub async fn tmy(token: Option<String>, request: TmyRequest) -> Result<TimeSeriesFrame> {
    let mut client = TmyClient::new(".", None, token, None)?.with_dataframes(true);
    let name = request.site_name.clone();
    client.add_request(request);
    single_frame(client, name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests::{ScriptedTransport, pending, success};
    use crate::request::TimeSeriesRequest;
    use futures::StreamExt;

    fn client(transport: ScriptedTransport) -> (TimeSeriesClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let client = TimeSeriesClient::with_transport(TimeSeries, "unused", transport.clone())
            .with_progress(false)
            .with_poll_interval(Duration::from_secs(4));
        (client, transport)
    }

    #[test]
    fn add_request_replaces_same_name() {
        let (mut client, _) = client(ScriptedTransport::default());
        client.add_request(TimeSeriesRequest::new("a", 1.0, 2.0));
        client.add_request(TimeSeriesRequest::new("b", 1.0, 2.0));
        client.add_request(TimeSeriesRequest::new("a", 3.0, 4.0));

        let names: Vec<&str> = client.requests().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(client.requests()[0].1["site"]["latitude"], 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_job_is_yielded_before_slow_job() {
        let slow: Vec<_> = (0..10)
            .map(|_| pending("PROCESSING"))
            .chain([success("https://dl/slow.json")])
            .collect();
        let transport = ScriptedTransport::default()
            .job("slow", Some("r-slow"), &slow)
            .job("fast", Some("r-fast"), &[pending("ACCEPTED"), success("https://dl/fast.json")]);
        let (mut client, transport) = client(transport);
        client.add_request(TimeSeriesRequest::new("slow", 0.0, 0.0));
        client.add_request(TimeSeriesRequest::new("fast", 0.0, 0.0));

        let order: Vec<String> = client
            .retrieve_data(false)
            .map(|(name, outcome)| {
                assert!(outcome.is_ok());
                name
            })
            .collect()
            .await;
        assert_eq!(order, ["fast", "slow"]);
        assert_eq!(transport.polls_of("r-fast"), 2);
        assert_eq!(transport.polls_of("r-slow"), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn every_request_resolves_once() {
        let transport = ScriptedTransport::default()
            .job("ok", Some("r1"), &[success("https://dl/ok_SOLARGIS_JSON.json")])
            .job("bad", Some("r2"), &[pending("error")])
            .job("rejected", None, &[]);
        let (mut client, _) = client(transport);
        for name in ["ok", "bad", "rejected", "offline"] {
            client.add_request(TimeSeriesRequest::new(name, 0.0, 0.0));
        }

        let report = client.retrieve_all_data(false).await;
        assert_eq!(report.succeeded, ["ok"]);
        assert_eq!(
            report.failed.keys().map(String::as_str).collect::<Vec<_>>(),
            ["bad", "offline", "rejected"]
        );
        assert!(!report.is_complete_success());
        assert_eq!(client.datasets().len(), 1);
        assert_eq!(client.dataset("ok").unwrap().file_label, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rerun_drops_stale_dataset() {
        let transport = ScriptedTransport::default().job("a", Some("r1"), &[success("https://dl/a.json")]);
        let (mut client, transport) = client(transport);
        client.add_request(TimeSeriesRequest::new("a", 0.0, 0.0));
        assert!(client.retrieve_all_data(false).await.is_complete_success());
        assert!(client.dataset("a").is_some());

        transport
            .statuses
            .lock()
            .unwrap()
            .insert("r1".into(), [pending("error")].into_iter().collect());
        let report = client.retrieve_all_data(false).await;
        assert!(report.failed.contains_key("a"));
        assert!(client.dataset("a").is_none());
    }
}
