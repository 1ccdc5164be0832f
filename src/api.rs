use serde_json::{Map, Value};

/// Reply to a data-request submission.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SubmitReply {
    #[serde(default, rename = "requestId")]
    request_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubmitReply {
    pub fn new(request_id: Option<&str>) -> Self {
        Self {
            request_id: request_id.map(|id| Value::String(id.to_string())),
            extra: Map::new(),
        }
    }

    /// The job id, accepted as a JSON string or number.
    pub fn request_id(&self) -> Option<String> {
        match self.request_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        Value::Object(self.extra.clone()).to_string()
    }
}

/// Reply from the status endpoint of one job.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "downloadUrl")]
    pub download_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusReply {
    pub fn new(status: &str, download_url: Option<&str>) -> Self {
        Self {
            status: Some(status.to_string()),
            download_url: download_url.map(str::to_string),
            extra: Map::new(),
        }
    }

    pub fn job_status(&self) -> Option<JobStatus> {
        self.status.as_deref().map(JobStatus::parse)
    }

    pub(crate) fn describe(&self) -> String {
        Value::Object(self.extra.clone()).to_string()
    }
}

/// Where a remote job stands, as reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failed(String),
    /// Any other status; polling continues.
    Pending(String),
}

impl JobStatus {
    pub fn parse(status: &str) -> Self {
        if status.eq_ignore_ascii_case("success") {
            JobStatus::Success
        } else if status.eq_ignore_ascii_case("error") {
            JobStatus::Failed(status.to_string())
        } else {
            JobStatus::Pending(status.to_string())
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending(_))
    }
}

/// A downloaded result body.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// Last path segment of the final download URL.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(JobStatus::parse("success"), JobStatus::Success);
        assert_eq!(JobStatus::parse("SUCCESS"), JobStatus::Success);
        assert_eq!(JobStatus::parse("error"), JobStatus::Failed("error".into()));
        assert_eq!(
            JobStatus::parse("PROCESSING"),
            JobStatus::Pending("PROCESSING".into())
        );
        assert!(!JobStatus::parse("accepted").is_terminal());
        assert!(JobStatus::parse("ERROR").is_terminal());
    }

    #[test]
    fn submit_reply_request_id_forms() {
        let r: SubmitReply = serde_json::from_str(r#"{"requestId":"abc-1"}"#).unwrap();
        assert_eq!(r.request_id().as_deref(), Some("abc-1"));

        let r: SubmitReply = serde_json::from_str(r#"{"requestId":42}"#).unwrap();
        assert_eq!(r.request_id().as_deref(), Some("42"));

        let r: SubmitReply =
            serde_json::from_str(r#"{"message":"bad latitude","code":400}"#).unwrap();
        assert_eq!(r.request_id(), None);
        assert!(r.describe().contains("bad latitude"));
    }

    #[test]
    fn status_reply_keeps_unknown_fields() {
        let r: StatusReply = serde_json::from_str(
            r#"{"status":"success","downloadUrl":"https://h/f.json","progress":100}"#,
        )
        .unwrap();
        assert_eq!(r.job_status(), Some(JobStatus::Success));
        assert_eq!(r.download_url.as_deref(), Some("https://h/f.json"));
        assert_eq!(r.extra["progress"], 100);

        let r: StatusReply = serde_json::from_str(r#"{"state":"running"}"#).unwrap();
        assert_eq!(r.job_status(), None);
    }
}
