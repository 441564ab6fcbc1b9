//! HTTP meeting API.
//!
//! Only one call is needed before joining: registering a meeting ID with the
//! backend so the WebSocket endpoint accepts it.

use chrono::{DateTime, Duration, Utc};
use framewise_core::wire_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ApiError;

const SETUP_MEETING_PATH: &str = "/api/py/setup-meeting";

/// Meetings without an explicit end stay open this long.
pub const DEFAULT_MEETING_HOURS: i64 = 1000;

#[derive(Debug, Serialize)]
struct SetupMeetingRequest<'a> {
    meeting_id: &'a str,
    api_key: &'a str,
    start_time_utc: String,
    end_time_utc: String,
}

/// Response of the setup call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeetingInfo {
    /// The registered meeting ID.
    pub meeting_id: String,
    /// Any other fields the backend returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client for the HTTP meeting API.
#[derive(Debug, Clone)]
pub struct MeetingApi {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl MeetingApi {
    /// Creates a client for `base_url`.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
            api_key: api_key.into(),
        })
    }

    /// Creates a client from the `[service]` settings.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let api_key = config
            .api_key()
            .map_err(|e| ApiError::Secret(e.to_string()))?
            .ok_or(ApiError::MissingApiKey)?;
        Self::new(&config.service.api_base_url, api_key)
    }

    /// Registers a meeting.
    ///
    /// `start` defaults to now and `end` to [`DEFAULT_MEETING_HOURS`] after
    /// the start.
    pub async fn setup_meeting(
        &self,
        meeting_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MeetingInfo, ApiError> {
        let url = self.base_url.join(SETUP_MEETING_PATH)?;
        let request = setup_request(meeting_id, &self.api_key, start, end);
        debug!(%url, meeting_id, "setting up meeting");

        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let info: MeetingInfo = response.json().await?;
        info!(meeting_id = %info.meeting_id, "meeting created");
        Ok(info)
    }
}

fn setup_request<'a>(
    meeting_id: &'a str,
    api_key: &'a str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> SetupMeetingRequest<'a> {
    let start = start.unwrap_or_else(Utc::now);
    let end = end.unwrap_or(start + Duration::hours(DEFAULT_MEETING_HOURS));
    SetupMeetingRequest {
        meeting_id,
        api_key,
        start_time_utc: wire_timestamp(start),
        end_time_utc: wire_timestamp(end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn default_end_is_far_out() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let request = setup_request("m", "k", Some(start), None);
        assert_eq!(request.start_time_utc, "2026-01-01T00:00:00.000Z");
        assert_eq!(request.end_time_utc, "2026-02-11T16:00:00.000Z");
    }

    #[test]
    fn request_body_shape() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let value = serde_json::to_value(setup_request("m-1", "key", Some(start), Some(end))).unwrap();
        assert_eq!(value["meeting_id"], "m-1");
        assert_eq!(value["api_key"], "key");
        assert_eq!(value["end_time_utc"], "2026-01-01T01:00:00.000Z");
    }

    #[test]
    fn from_config_needs_key() {
        assert!(matches!(
            MeetingApi::from_config(&ClientConfig::default()),
            Err(ApiError::MissingApiKey)
        ));
        assert!(MeetingApi::from_config(&ClientConfig::default().with_api_key("k")).is_ok());
    }

    #[tokio::test]
    async fn setup_meeting_posts_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/py/setup-meeting"))
            .and(body_partial_json(json!({"meeting_id": "m-9", "api_key": "key-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"meeting_id": "m-9", "status": "created"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = MeetingApi::new(&server.uri(), "key-1").unwrap();
        let info = api.setup_meeting("m-9", None, None).await.unwrap();
        assert_eq!(info.meeting_id, "m-9");
        assert_eq!(info.extra["status"], "created");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["start_time_utc"].as_str().unwrap().ends_with('Z'));
        assert!(body["end_time_utc"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn setup_meeting_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/py/setup-meeting"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "bad key"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = MeetingApi::new(&server.uri(), "key-1").unwrap();
        let err = api.setup_meeting("m-9", None, None).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status: 403, ref body } if body.contains("bad key")
        ));
    }
}
