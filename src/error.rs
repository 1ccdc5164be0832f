use std::fmt;

use anyhow::anyhow;
use reqwest::StatusCode;

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<u16>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
    // Some endpoints respond with {"message":...} or {"error":...}
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

pub(crate) fn format_api_error(
    status: StatusCode,
    url: &str,
    e: &ApiErrorResponse,
) -> anyhow::Error {
    let title = e
        .title
        .as_deref()
        .or(e.message.as_deref())
        .or(e.error.as_deref())
        .unwrap_or("");
    let detail = e.detail.as_deref().unwrap_or("");
    let status_in_body = e.status.unwrap_or(status.as_u16());

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return anyhow!(
            "Solargis API authentication/authorization failed (HTTP {}).\n- Check the API key (SGAPI_TS_KEY / SGAPI_TMY_KEY or `ts_key:` / `tmy_key:` in .sgapirc)\n- TS and TMY subscriptions use different keys\n- Ensure the key is not expired\n\nServer message: {}\n{}\nrequest: {}",
            status_in_body,
            title,
            detail,
            url
        );
    }

    if status == StatusCode::NOT_FOUND {
        return anyhow!(
            "Solargis API endpoint not found (HTTP 404).\n- The configured URL may be wrong; the TS API lives at https://api.solargis.com/ts/data-request\n\nServer message: {}\n{}\nrequest: {}",
            title,
            detail,
            url
        );
    }

    anyhow!(
        "API request failed: HTTP {} for url ({})\n{}\n{}",
        status_in_body,
        url,
        title,
        detail
    )
}

/// Step of a request's lifecycle at which something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submit,
    Poll,
    Download,
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Submit => "submit",
            Phase::Poll => "poll",
            Phase::Download => "download",
            Phase::Read => "read",
        })
    }
}

/// Terminal failure of one named request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("submission rejected, no requestId in reply: {0}")]
    Rejected(String),

    #[error("job {request_id} finished with status {status:?}")]
    JobFailed { request_id: String, status: String },

    #[error("status reply for job {request_id} has no status field: {reply}")]
    MissingStatus { request_id: String, reply: String },

    #[error("job {request_id} succeeded without a downloadUrl")]
    MissingDownloadUrl { request_id: String },

    #[error("{phase} failed: {error:#}")]
    Transport { phase: Phase, error: anyhow::Error },
}

impl RequestError {
    pub(crate) fn at(phase: Phase) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| RequestError::Transport { phase, error }
    }

    /// Phase the failure surfaced in.
    pub fn phase(&self) -> Phase {
        match self {
            RequestError::Rejected(_) => Phase::Submit,
            RequestError::JobFailed { .. }
            | RequestError::MissingStatus { .. }
            | RequestError::MissingDownloadUrl { .. } => Phase::Poll,
            RequestError::Transport { phase, .. } => *phase,
        }
    }
}
