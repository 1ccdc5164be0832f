//! Drives one named request from submission to a dataset or a terminal failure.

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::JobStatus;
use crate::error::{Phase, RequestError};
use crate::product::{Dataset, Product};
use crate::transport::Transport;

/// Fixed delay between two polls of the same job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Where a request currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Submitting,
    Queued { request_id: String },
    Polling { request_id: String, status: String },
    Downloading { request_id: String },
    Reading,
    Saving,
    Done,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Submitting => f.write_str("submitting"),
            RequestState::Queued { request_id } => write!(f, "queued as {}", request_id),
            RequestState::Polling { status, .. } => write!(f, "status {:?}", status),
            RequestState::Downloading { .. } => f.write_str("downloading"),
            RequestState::Reading => f.write_str("reading"),
            RequestState::Saving => f.write_str("saving"),
            RequestState::Done => f.write_str("done"),
            RequestState::Failed => f.write_str("failed"),
        }
    }
}

pub(crate) fn spinner(name: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(name.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub(crate) struct Lifecycle<'a, P: Product> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) product: &'a P,
    pub(crate) poll_interval: Duration,
    /// Save into this folder once read; `None` keeps the dataset in memory only.
    pub(crate) dest: Option<&'a Path>,
}

impl<P: Product> Lifecycle<'_, P> {
    pub(crate) async fn run(
        &self,
        name: &str,
        body: &Value,
        pb: &ProgressBar,
    ) -> Result<Dataset, RequestError> {
        let result = self.drive(name, body, pb).await;
        match &result {
            Ok(_) => {
                pb.finish_with_message(RequestState::Done.to_string());
            }
            Err(e) => {
                warn!("error while retrieving data for {}: {}", name, e);
                pb.abandon_with_message(format!("{}: {}", RequestState::Failed, e));
            }
        }
        result
    }

    async fn drive(
        &self,
        name: &str,
        body: &Value,
        pb: &ProgressBar,
    ) -> Result<Dataset, RequestError> {
        let set = |state: RequestState| pb.set_message(state.to_string());

        set(RequestState::Submitting);
        info!("sending request to {} API", P::TAG);
        let reply = self
            .transport
            .submit(body)
            .await
            .map_err(RequestError::at(Phase::Submit))?;
        let request_id = reply
            .request_id()
            .ok_or_else(|| RequestError::Rejected(reply.describe()))?;
        info!(%request_id, "request was created");
        set(RequestState::Queued {
            request_id: request_id.clone(),
        });

        let mut last_status: Option<String> = None;
        let download_url = loop {
            let reply = self
                .transport
                .status(&request_id)
                .await
                .map_err(RequestError::at(Phase::Poll))?;
            let Some(status) = reply.job_status() else {
                return Err(RequestError::MissingStatus {
                    request_id,
                    reply: reply.describe(),
                });
            };

            let raw = reply.status.clone().unwrap_or_default();
            if last_status.as_deref() != Some(raw.as_str()) {
                info!(%request_id, status = %raw, "job status changed");
                last_status = Some(raw.clone());
            } else {
                debug!(%request_id, status = %raw, "job still running");
            }
            set(RequestState::Polling {
                request_id: request_id.clone(),
                status: raw,
            });

            match status {
                JobStatus::Success => {
                    break reply.download_url.ok_or_else(|| {
                        RequestError::MissingDownloadUrl {
                            request_id: request_id.clone(),
                        }
                    })?;
                }
                JobStatus::Failed(status) => {
                    return Err(RequestError::JobFailed { request_id, status });
                }
                JobStatus::Pending(_) => tokio::time::sleep(self.poll_interval).await,
            }
        };

        set(RequestState::Downloading {
            request_id: request_id.clone(),
        });
        let payload = self
            .transport
            .download(&download_url)
            .await
            .map_err(RequestError::at(Phase::Download))?;
        debug!(%request_id, bytes = payload.bytes.len(), "payload downloaded");

        set(RequestState::Reading);
        let mut dataset = self
            .product
            .read(name, payload)
            .map_err(RequestError::at(Phase::Read))?;

        if let Some(dest) = self.dest {
            set(RequestState::Saving);
            match self.product.save(dest, &dataset) {
                Ok(saved) => dataset.saved = saved,
                Err(e) => warn!("error while saving data for {}: {:#}", name, e),
            }
        }

        Ok(dataset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{Payload, StatusReply, SubmitReply};
    use crate::product::{TimeSeries, Tmy};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub(crate) const DOC: &str =
        r#"{"site":{"name":"a"},"data":[{"DATETIME":"2024-01-01T00:00:00Z","GHI":3.5}]}"#;

    /// Scripted in-memory API: each request id replays its status replies in order.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) ids: Mutex<HashMap<String, Option<String>>>,
        pub(crate) statuses: Mutex<HashMap<String, VecDeque<StatusReply>>>,
        pub(crate) polls: Mutex<Vec<String>>,
        pub(crate) fail_download: bool,
        /// Downloaded bytes; defaults to [`DOC`].
        pub(crate) payload: Option<Vec<u8>>,
    }

    impl ScriptedTransport {
        /// Registers the site `name` as job `id` with the given status sequence.
        pub(crate) fn job(self, name: &str, id: Option<&str>, statuses: &[StatusReply]) -> Self {
            self.ids
                .lock()
                .unwrap()
                .insert(name.to_string(), id.map(str::to_string));
            if let Some(id) = id {
                self.statuses
                    .lock()
                    .unwrap()
                    .insert(id.to_string(), statuses.iter().cloned().collect());
            }
            self
        }

        pub(crate) fn polls_of(&self, id: &str) -> usize {
            self.polls.lock().unwrap().iter().filter(|p| *p == id).count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn submit(&self, body: &Value) -> Result<SubmitReply> {
            let name = body["site"]["name"].as_str().unwrap_or_default();
            match self.ids.lock().unwrap().get(name) {
                Some(id) => Ok(SubmitReply::new(id.as_deref())),
                None => Err(anyhow!("connection refused")),
            }
        }

        async fn status(&self, request_id: &str) -> Result<StatusReply> {
            self.polls.lock().unwrap().push(request_id.to_string());
            let mut statuses = self.statuses.lock().unwrap();
            let queue = statuses
                .get_mut(request_id)
                .ok_or_else(|| anyhow!("unknown job {}", request_id))?;
            // The last reply repeats forever.
            if queue.len() > 1 {
                Ok(queue.pop_front().unwrap())
            } else {
                queue.front().cloned().ok_or_else(|| anyhow!("no replies"))
            }
        }

        async fn download(&self, url: &str) -> Result<Payload> {
            if self.fail_download {
                return Err(anyhow!("HTTP 500"));
            }
            Ok(Payload {
                bytes: self
                    .payload
                    .clone()
                    .unwrap_or_else(|| DOC.as_bytes().to_vec()),
                file_name: url.rsplit('/').next().map(str::to_string),
                content_type: Some("application/json".into()),
            })
        }
    }

    pub(crate) fn pending(status: &str) -> StatusReply {
        StatusReply::new(status, None)
    }

    pub(crate) fn success(url: &str) -> StatusReply {
        StatusReply::new("success", Some(url))
    }

    async fn run(transport: &ScriptedTransport, name: &str) -> Result<Dataset, RequestError> {
        run_with(transport, &TimeSeries, name, None).await
    }

    async fn run_with<P: Product>(
        transport: &ScriptedTransport,
        product: &P,
        name: &str,
        dest: Option<&Path>,
    ) -> Result<Dataset, RequestError> {
        let lifecycle = Lifecycle {
            transport,
            product,
            poll_interval: DEFAULT_POLL_INTERVAL,
            dest,
        };
        let body = serde_json::json!({"site": {"name": name}});
        lifecycle.run(name, &body, &ProgressBar::hidden()).await
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_success_then_downloads() {
        let transport = ScriptedTransport::default().job(
            "a",
            Some("r1"),
            &[
                pending("ACCEPTED"),
                pending("PROCESSING"),
                success("https://dl/a_SOLARGIS_JSON.json"),
            ],
        );

        let dataset = run(&transport, "a").await.unwrap();
        assert_eq!(dataset.file_label, "a");
        assert_eq!(dataset.frame.map(|f| f.len()), Some(1));
        assert!(dataset.saved.is_empty());
        assert_eq!(transport.polls_of("r1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_is_terminal() {
        let transport =
            ScriptedTransport::default().job("a", Some("r1"), &[pending("queued"), pending("error")]);

        let err = run(&transport, "a").await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::JobFailed { ref request_id, ref status } if request_id == "r1" && status == "error"
        ));
        assert_eq!(transport.polls_of("r1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_request_id_is_rejected() {
        let transport = ScriptedTransport::default().job("a", None, &[]);
        let err = run(&transport, "a").await.unwrap_err();
        assert!(matches!(err, RequestError::Rejected(_)));
        assert_eq!(err.phase(), Phase::Submit);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_status_field_fails_request() {
        let transport = ScriptedTransport::default().job("a", Some("r1"), &[StatusReply::default()]);
        let err = run(&transport, "a").await.unwrap_err();
        assert!(matches!(err, RequestError::MissingStatus { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_url_fails_request() {
        let transport =
            ScriptedTransport::default().job("a", Some("r1"), &[StatusReply::new("success", None)]);
        let err = run(&transport, "a").await.unwrap_err();
        assert!(matches!(err, RequestError::MissingDownloadUrl { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_carry_phase() {
        let transport = ScriptedTransport::default();
        let err = run(&transport, "unknown").await.unwrap_err();
        assert_eq!(err.phase(), Phase::Submit);

        let transport = ScriptedTransport {
            fail_download: true,
            ..Default::default()
        }
        .job("a", Some("r1"), &[success("https://dl/a.json")]);
        let err = run(&transport, "a").await.unwrap_err();
        assert_eq!(err.phase(), Phase::Download);
    }

    #[tokio::test(start_paused = true)]
    async fn save_errors_do_not_fail_request() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("occupied");
        std::fs::write(&dest, b"").unwrap();

        let transport = ScriptedTransport::default().job(
            "a",
            Some("r1"),
            &[success("https://dl/a_SOLARGIS_JSON.json")],
        );
        let dataset = run_with(&transport, &TimeSeries, "a", Some(dest.as_path())).await.unwrap();
        assert!(dataset.frame.is_some());
        assert!(dataset.saved.is_empty());

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("b.csv", zip::write::FileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut writer, b"GHI\n1.0\n").unwrap();
        let archive = writer.finish().unwrap().into_inner();

        let transport = ScriptedTransport {
            payload: Some(archive.clone()),
            ..Default::default()
        }
        .job("b", Some("r2"), &[success("https://dl/b_TMY.zip")]);
        let dataset = run_with(&transport, &Tmy::default(), "b", Some(dest.as_path()))
            .await
            .unwrap();
        assert_eq!(dataset.archive, Some(archive));
        assert!(dataset.saved.is_empty());
        assert_eq!(std::fs::read(&dest).unwrap(), b"");
    }

    #[test]
    fn state_display() {
        assert_eq!(
            RequestState::Polling {
                request_id: "r".into(),
                status: "PROCESSING".into()
            }
            .to_string(),
            "status \"PROCESSING\""
        );
        assert_eq!(
            RequestState::Queued {
                request_id: "r1".into()
            }
            .to_string(),
            "queued as r1"
        );
    }
}
