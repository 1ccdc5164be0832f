//! The two data-request APIs: how their payloads are read and saved.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api::Payload;
use crate::frame::TimeSeriesFrame;
use crate::request::{DataRequest, TimeSeriesRequest, TmyRequest};
use crate::util::prettify_file_label;

/// Result of one finished request.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    /// Base name used for saved files.
    pub file_label: String,
    pub frame: Option<TimeSeriesFrame>,
    pub metadata: Option<Value>,
    /// Raw zip archive, TMY only.
    pub archive: Option<Vec<u8>>,
    pub saved: Vec<PathBuf>,
}

impl Dataset {
    fn new(name: &str, payload: &Payload) -> Self {
        let file_label = payload
            .file_name
            .as_deref()
            .map(prettify_file_label)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| name.to_string());
        Self {
            name: name.to_string(),
            file_label,
            frame: None,
            metadata: None,
            archive: None,
            saved: Vec::new(),
        }
    }
}

/// One API variant.
pub trait Product: Send + Sync + 'static {
    type Request: DataRequest;

    /// Short tag used for configuration lookup (`ts`, `tmy`).
    const TAG: &'static str;
    const DEFAULT_URL: &'static str;

    /// Last adjustment of a request body before submission.
    fn prepare(&self, _body: &mut Value) {}

    fn read(&self, name: &str, payload: Payload) -> Result<Dataset>;

    /// Writes the dataset below `dest`; returns the paths written.
    ///
    /// Individual file errors are logged and skipped.
    fn save(&self, dest: &Path, dataset: &Dataset) -> Result<Vec<PathBuf>>;
}

/// Time-series API: JSON payload parsed into a frame plus metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSeries;

impl Product for TimeSeries {
    type Request = TimeSeriesRequest;

    const TAG: &'static str = "ts";
    const DEFAULT_URL: &'static str = "https://api.solargis.com/ts/data-request";

    fn read(&self, name: &str, payload: Payload) -> Result<Dataset> {
        let mut dataset = Dataset::new(name, &payload);
        let (frame, metadata) = TimeSeriesFrame::from_slice(&payload.bytes)
            .with_context(|| format!("failed to read SOLARGIS_JSON payload for {}", name))?;
        dataset.frame = Some(frame);
        dataset.metadata = Some(metadata);
        Ok(dataset)
    }

    fn save(&self, dest: &Path, dataset: &Dataset) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create directory {}", dest.display()))?;
        let mut saved = Vec::new();

        if let Some(frame) = &dataset.frame {
            let data_path = dest.join(format!("{}.csv", dataset.file_label));
            match frame.write_csv(&data_path) {
                Ok(()) => {
                    info!(name = %dataset.name, path = %data_path.display(), "data saved");
                    saved.push(data_path);
                }
                Err(e) => warn!(name = %dataset.name, "error while saving data: {:#}", e),
            }
        }

        if let Some(metadata) = &dataset.metadata {
            let metadata_path = dest.join(format!("{}_metadata.json", dataset.file_label));
            match write_json(&metadata_path, metadata) {
                Ok(()) => {
                    info!(name = %dataset.name, path = %metadata_path.display(), "metadata saved");
                    saved.push(metadata_path);
                }
                Err(e) => warn!(name = %dataset.name, "error while saving metadata: {:#}", e),
            }
        }

        Ok(saved)
    }
}

/// Typical-meteorological-year API: zip archive, optionally parsed into a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmy {
    /// Parse the archive's SOLARGIS_JSON member. Forces that format into every request.
    pub dataframes: bool,
}

impl Product for Tmy {
    type Request = TmyRequest;

    const TAG: &'static str = "tmy";
    const DEFAULT_URL: &'static str = "https://api.solargis.com/tmy/data-request";

    fn prepare(&self, body: &mut Value) {
        if !self.dataframes {
            return;
        }
        let Some(obj) = body.as_object_mut() else {
            return;
        };
        let formats = obj
            .entry("outputFormats")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(formats) = formats {
            if !formats.iter().any(|f| f == "SOLARGIS_JSON") {
                formats.push(Value::from("SOLARGIS_JSON"));
            }
        }
    }

    fn read(&self, name: &str, payload: Payload) -> Result<Dataset> {
        let mut dataset = Dataset::new(name, &payload);

        {
            let mut archive = zip::ZipArchive::new(Cursor::new(payload.bytes.as_slice()))
                .with_context(|| format!("failed to open TMY archive for {}", name))?;
            if self.dataframes {
                if let Some(json) = json_member(&mut archive)
                    .with_context(|| format!("failed to read TMY archive for {}", name))?
                {
                    let (frame, metadata) = TimeSeriesFrame::from_slice(&json).with_context(
                        || format!("failed to read SOLARGIS_JSON member for {}", name),
                    )?;
                    dataset.frame = Some(frame);
                    dataset.metadata = Some(metadata);
                }
            }
        }

        dataset.archive = Some(payload.bytes);
        Ok(dataset)
    }

    fn save(&self, dest: &Path, dataset: &Dataset) -> Result<Vec<PathBuf>> {
        let Some(archive) = &dataset.archive else {
            return Ok(Vec::new());
        };
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create directory {}", dest.display()))?;

        let data_path = dest.join(&dataset.file_label);
        match std::fs::write(&data_path, archive) {
            Ok(()) => {
                info!(name = %dataset.name, path = %data_path.display(), "zipped data saved");
                Ok(vec![data_path])
            }
            Err(e) => {
                warn!(name = %dataset.name, "error while saving data: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

/// Contents of the first `.json` member of a zip archive, in central-directory order.
fn json_member<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<Option<Vec<u8>>> {
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.name().to_ascii_lowercase().ends_with(".json") {
            let mut out = Vec::new();
            file.read_to_end(&mut out)
                .with_context(|| format!("failed to extract {}", file.name()))?;
            return Ok(Some(out));
        }
    }
    Ok(None)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let text = serde_json::to_string(value)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}
