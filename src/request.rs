use serde_json::{Map, Value, json};

use crate::util::{to_safe_file_label, to_safe_tmy_file_label};

/// Columns requested from the TS API when none are given.
pub const DEFAULT_PARAM_LIST: &[&str] = &[
    "GHI",
    "DNI",
    "DIF",
    "GHI_NOSHD",
    "DNI_NOSHD",
    "DIF_NOSHD",
    "CI_FLAG",
    "SUN_ELEVATION",
    "SUN_AZIMUTH",
    "TEMP",
    "WS",
    "WD",
    "WG",
    "RH",
    "AP",
    "PWAT",
    "PREC",
    "TD",
    "WBT",
    "SDWE",
    "SFWE",
];

/// Timestamp alignment the TS API expects for a given time step.
pub fn time_alignment(time_step: &str) -> &'static str {
    match time_step {
        "P1D" | "P1M" | "P1Y" => "START",
        _ => "CENTER",
    }
}

/// A request body that can be submitted under a name.
pub trait DataRequest {
    /// Name the request is tracked under; the site name for typed requests.
    fn name(&self) -> &str;
    fn to_body(&self) -> Value;
}

/// Request for the time-series (TS) API.
///
/// ```
/// use sgapi::{DataRequest, TimeSeriesRequest};
///
/// let req = TimeSeriesRequest::new("Linz", 48.275231, 14.26934)
///     .time_step("P1Y")
///     .parameters(["GHI", "DNI", "TEMP"]);
/// assert_eq!(req.to_body()["timeAlignment"], "START");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRequest {
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Empty means [`DEFAULT_PARAM_LIST`].
    pub parameters: Vec<String>,
    pub from_date: String,
    pub to_date: String,
    pub time_step: String,
    pub terrain_shading: bool,
    pub site_elevation: Option<f64>,
    pub utc_offset: String,
    /// Merged into the body last, overriding generated keys.
    pub extra: Map<String, Value>,
}

impl TimeSeriesRequest {
    pub fn new(site_name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            site_name: site_name.into(),
            latitude,
            longitude,
            parameters: Vec::new(),
            from_date: "AUTODETECT".to_string(),
            to_date: "LAST_MONTH".to_string(),
            time_step: "PT15M".to_string(),
            terrain_shading: true,
            site_elevation: None,
            utc_offset: "+00:00".to_string(),
            extra: Map::new(),
        }
    }

    pub fn parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_date(mut self, from_date: impl Into<String>) -> Self {
        self.from_date = from_date.into();
        self
    }

    pub fn to_date(mut self, to_date: impl Into<String>) -> Self {
        self.to_date = to_date.into();
        self
    }

    pub fn time_step(mut self, time_step: impl Into<String>) -> Self {
        self.time_step = time_step.into();
        self
    }

    pub fn terrain_shading(mut self, terrain_shading: bool) -> Self {
        self.terrain_shading = terrain_shading;
        self
    }

    pub fn site_elevation(mut self, elevation: f64) -> Self {
        self.site_elevation = Some(elevation);
        self
    }

    pub fn utc_offset(mut self, utc_offset: impl Into<String>) -> Self {
        self.utc_offset = utc_offset.into();
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl DataRequest for TimeSeriesRequest {
    fn name(&self) -> &str {
        &self.site_name
    }

    fn to_body(&self) -> Value {
        let columns: Vec<String> = if self.parameters.is_empty() {
            DEFAULT_PARAM_LIST.iter().map(|p| p.to_string()).collect()
        } else {
            self.parameters.clone()
        };

        let mut site = json!({
            "latitude": self.latitude,
            "longitude": self.longitude,
            "name": self.site_name,
        });
        if let Some(elevation) = self.site_elevation {
            site["elevation"] = json!(elevation);
        }

        let mut body = json!({
            "requestType": "TIMESERIES",
            "site": site,
            "timeStep": self.time_step,
            "columns": columns,
            "fromDate": self.from_date,
            "toDate": self.to_date,
            "utcOffset": self.utc_offset,
            "timeAlignment": time_alignment(&self.time_step),
            "fileLabel": to_safe_file_label(&self.site_name),
            "terrainShading": self.terrain_shading,
            "outputFormat": "SOLARGIS_JSON",
            "compressOutput": false,
        });
        merge_extra(&mut body, &self.extra);
        body
    }
}

/// Request for the typical-meteorological-year (TMY) API.
#[derive(Debug, Clone, PartialEq)]
pub struct TmyRequest {
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Defaults to the site name. Always sanitised and cut to 10 characters.
    pub file_label: Option<String>,
    pub output_formats: Vec<String>,
    pub time_step: String,
    pub tmy_scenario: String,
    pub extra: Map<String, Value>,
}

impl TmyRequest {
    pub fn new(site_name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            site_name: site_name.into(),
            latitude,
            longitude,
            file_label: None,
            output_formats: vec!["SOLARGIS_JSON".to_string()],
            time_step: "PT60M".to_string(),
            tmy_scenario: "P50".to_string(),
            extra: Map::new(),
        }
    }

    pub fn file_label(mut self, file_label: impl Into<String>) -> Self {
        self.file_label = Some(file_label.into());
        self
    }

    pub fn output_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn time_step(mut self, time_step: impl Into<String>) -> Self {
        self.time_step = time_step.into();
        self
    }

    pub fn tmy_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.tmy_scenario = scenario.into();
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl DataRequest for TmyRequest {
    fn name(&self) -> &str {
        &self.site_name
    }

    fn to_body(&self) -> Value {
        let label = self.file_label.as_deref().unwrap_or(&self.site_name);
        let mut body = json!({
            "siteName": self.site_name,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "fileLabel": to_safe_tmy_file_label(label),
            "outputFormats": self.output_formats,
            "timeStep": self.time_step,
            "tmyScenario": self.tmy_scenario,
        });
        merge_extra(&mut body, &self.extra);
        body
    }
}

fn merge_extra(body: &mut Value, extra: &Map<String, Value>) {
    if let Some(obj) = body.as_object_mut() {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeseries_body_has_defaults() {
        let body = TimeSeriesRequest::new("Linz site", 48.27, 14.27).to_body();

        assert_eq!(body["requestType"], "TIMESERIES");
        assert_eq!(body["site"]["name"], "Linz site");
        assert_eq!(body["site"]["latitude"], 48.27);
        assert!(body["site"].get("elevation").is_none());
        assert_eq!(body["timeStep"], "PT15M");
        assert_eq!(body["timeAlignment"], "CENTER");
        assert_eq!(body["fromDate"], "AUTODETECT");
        assert_eq!(body["toDate"], "LAST_MONTH");
        assert_eq!(body["fileLabel"], "Linz_site");
        assert_eq!(body["outputFormat"], "SOLARGIS_JSON");
        assert_eq!(body["compressOutput"], false);
        assert_eq!(
            body["columns"].as_array().map(|c| c.len()),
            Some(DEFAULT_PARAM_LIST.len())
        );
    }

    #[test]
    fn timeseries_body_uses_overrides() {
        let body = TimeSeriesRequest::new("a", 1.0, 2.0)
            .parameters(["GHI", "TEMP"])
            .time_step("P1D")
            .site_elevation(0.0)
            .terrain_shading(false)
            .extra("fileLabel", "custom")
            .to_body();

        assert_eq!(body["columns"], json!(["GHI", "TEMP"]));
        assert_eq!(body["timeAlignment"], "START");
        assert_eq!(body["site"]["elevation"], 0.0);
        assert_eq!(body["terrainShading"], false);
        assert_eq!(body["fileLabel"], "custom");
    }

    #[test]
    fn alignment_by_time_step() {
        assert_eq!(time_alignment("PT15M"), "CENTER");
        assert_eq!(time_alignment("P1H"), "CENTER");
        assert_eq!(time_alignment("PT60M"), "CENTER");
        assert_eq!(time_alignment("P1M"), "START");
        assert_eq!(time_alignment("P1Y"), "START");
    }

    #[test]
    fn tmy_body_defaults_and_label() {
        let body = TmyRequest::new("Basic example Site", 35.3, -117.2).to_body();

        assert_eq!(body["siteName"], "Basic example Site");
        assert_eq!(body["fileLabel"], "Basic_exam");
        assert_eq!(body["outputFormats"], json!(["SOLARGIS_JSON"]));
        assert_eq!(body["timeStep"], "PT60M");
        assert_eq!(body["tmyScenario"], "P50");
    }

    #[test]
    fn tmy_explicit_label_is_sanitised() {
        let body = TmyRequest::new("Pro example Site", 48.6, 20.8)
            .file_label("pro 01")
            .output_formats(["SOLARGIS_CSV", "SAM"])
            .tmy_scenario("P90")
            .to_body();

        assert_eq!(body["fileLabel"], "pro_01");
        assert_eq!(body["outputFormats"], json!(["SOLARGIS_CSV", "SAM"]));
        assert_eq!(body["tmyScenario"], "P90");
    }
}
