//! Posts CVE advisories modified since the previous poll.
pub mod models;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use self::models::{CveItem, CvePage};
use crate::notifications::models::{Embed, EmbedAuthor, EmbedField, EmbedFooter, WebhookPayload};
use crate::notifications::senders::Notifier;

pub const DEFAULT_ENDPOINT: &str = "https://services.nvd.nist.gov";
const SEARCH_PATH: &str = "/rest/json/cves/1.0/";
const PAGE_SIZE: usize = 100;
const DETAIL_URL: &str = "https://nvd.nist.gov/vuln/detail/";

#[derive(Error, Debug)]
pub enum CveError {
    #[error("Advisory feed request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Advisory feed returned status {0}")]
    Status(u16),
}

/// Contents of `cve.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CveState {
    /// End of the previous poll window, in the feed's date format.
    pub last: String,
    pub webhook: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criticality {
    pub score: f64,
    pub label: &'static str,
    pub color: u32,
}

pub fn criticality(score: f64) -> Criticality {
    let (label, color) = if score > 8.9 {
        ("Critical", 11141375)
    } else if score > 6.9 {
        ("High", 16711680)
    } else if score > 3.9 {
        ("Medium", 16746496)
    } else {
        ("Low", 16776960)
    };
    Criticality { score, label, color }
}

/// Formats `now` the way the feed expects window bounds.
pub fn feed_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S:000 UTC").to_string()
}

pub struct CveFeed {
    client: Client,
    endpoint: String,
}

impl CveFeed {
    pub fn new(endpoint: &str) -> Result<Self, CveError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches every advisory modified in `[start, end]`, following pages.
    /// Entries that do not decode are logged and counted, not returned.
    pub async fn fetch_modified(
        &self,
        start: &str,
        end: &str,
    ) -> Result<FetchedAdvisories, CveError> {
        let url = format!("{}{}", self.endpoint, SEARCH_PATH);
        let mut fetched = FetchedAdvisories::default();
        let mut start_index = 0;

        let page_size = PAGE_SIZE.to_string();
        loop {
            let index = start_index.to_string();
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("modStartDate", start),
                    ("modEndDate", end),
                    ("startIndex", index.as_str()),
                    ("resultsPerPage", page_size.as_str()),
                ])
                .send()
                .await?;
            if response.status() != reqwest::StatusCode::OK {
                return Err(CveError::Status(response.status().as_u16()));
            }
            let page: CvePage = response.json().await?;
            let received = page.result.map(|r| r.items).unwrap_or_default();
            let count = received.len();
            for value in received {
                match serde_json::from_value::<CveItem>(value.clone()) {
                    Ok(item) => fetched.items.push(item),
                    Err(e) => {
                        let id = value
                            .pointer("/cve/CVE_data_meta/ID")
                            .and_then(|id| id.as_str())
                            .unwrap_or("unknown");
                        warn!(cve = %id, error = %e, "Skipping malformed advisory.");
                        fetched.malformed += 1;
                    }
                }
            }

            start_index = page.start_index + count;
            if count == 0 || start_index >= page.total_results {
                break;
            }
        }

        info!(
            count = fetched.items.len(),
            malformed = fetched.malformed,
            start = %start,
            end = %end,
            "Fetched modified advisories."
        );
        Ok(fetched)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchedAdvisories {
    pub items: Vec<CveItem>,
    pub malformed: usize,
}

fn trim_wildcards(cpe: &str) -> &str {
    let mut cpe = cpe;
    while let Some(stripped) = cpe.strip_suffix(":*") {
        cpe = stripped;
    }
    cpe
}

fn cpe_field(item: &CveItem) -> Option<EmbedField> {
    let mut value = String::new();
    let nodes = item.configurations.iter().flat_map(|c| c.nodes.iter());
    for cpe_match in nodes.flat_map(|node| node.cpe_match.iter()) {
        if !cpe_match.vulnerable {
            continue;
        }
        value.push_str(&format!("`{}`", trim_wildcards(&cpe_match.cpe23_uri)));
        if let Some(version) = &cpe_match.version_end_including {
            value.push_str(&format!(" <= {version}"));
        }
        value.push('\n');
    }
    (!value.is_empty()).then(|| EmbedField {
        name: "CPE".to_string(),
        value,
    })
}

fn references_field(item: &CveItem) -> EmbedField {
    let id = item.id();
    let mut value: String = item
        .cve
        .references
        .reference_data
        .iter()
        .map(|reference| {
            let name = reference.name.replace("https://", "").replace("http://", "");
            format!("[{name}]({})\n", reference.url)
        })
        .collect();
    value.push_str(&format!(
        "\n[CVE Details](https://www.cvedetails.com/cve/{id}) | \
         [Google](https://www.google.com/search?q={id}) | \
         [Github](https://github.com/search?q={id}) | \
         [Twitter](https://twitter.com/#!/search/realtime/{id}) | \
         [Youtube](https://www.youtube.com/results?search_query={id}) "
    ));
    EmbedField {
        name: "References".to_string(),
        value,
    }
}

/// Builds the alert embed, or `None` for advisories without a CVSS v3 score.
pub fn build_alert(item: &CveItem) -> Option<Embed> {
    let cvss = item.cvss_v3()?;
    let crit = criticality(cvss.base_score);
    let id = item.id();

    let mut fields: Vec<EmbedField> = cpe_field(item).into_iter().collect();
    fields.push(references_field(item));

    Some(Embed {
        title: id.to_string(),
        description: format!("{}\n\n_{}_", item.english_description(), cvss.vector_string),
        url: Some(format!("{DETAIL_URL}{id}")),
        color: Some(crit.color),
        author: Some(EmbedAuthor {
            name: format!("{:.1} - {}", crit.score, crit.label),
        }),
        footer: Some(EmbedFooter {
            text: format!("Assigned by {}", item.cve.meta.assigner),
        }),
        timestamp: Some(item.published_date.clone()),
        fields,
        ..Default::default()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CveRunSummary {
    pub fetched: usize,
    pub posted: usize,
    pub skipped: usize,
    /// Feed entries that could not be decoded.
    pub malformed: usize,
    pub failed: usize,
}

/// Polls the window `[state.last, now]`, posts one alert per scored advisory
/// and advances `state.last`. Individual post failures are logged and do not
/// stop the run; a failed fetch leaves the cursor untouched.
pub async fn poll(
    state: &mut CveState,
    feed: &CveFeed,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> Result<CveRunSummary, CveError> {
    let window_end = feed_timestamp(now);
    let FetchedAdvisories { items, malformed } =
        feed.fetch_modified(&state.last, &window_end).await?;
    state.last = window_end;

    let mut summary = CveRunSummary {
        fetched: items.len() + malformed,
        malformed,
        ..Default::default()
    };
    for item in &items {
        let Some(embed) = build_alert(item) else {
            summary.skipped += 1;
            continue;
        };
        let payload = WebhookPayload {
            embeds: vec![embed],
            ..Default::default()
        };
        match notifier.notify(&payload).await {
            Ok(()) => {
                info!(cve = %item.id(), published = %item.published_date, "Posted advisory.");
                summary.posted += 1;
            }
            Err(e) => {
                error!(cve = %item.id(), error = %e, "Failed to post advisory.");
                summary.failed += 1;
            }
        }
    }

    if summary.skipped > 0 {
        warn!(skipped = summary.skipped, "Skipped advisories without a CVSS v3 score.");
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::senders::SenderError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item_json(id: &str, score: Option<f64>) -> serde_json::Value {
        let impact = match score {
            Some(score) => json!({"baseMetricV3": {"cvssV3": {
                "baseScore": score,
                "vectorString": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            }}}),
            None => json!({}),
        };
        json!({
            "cve": {
                "CVE_data_meta": {"ID": id, "ASSIGNER": "cve@mitre.org"},
                "references": {"reference_data": [
                    {"url": "https://vendor.example/advisory", "name": "https://vendor.example/advisory"}
                ]},
                "description": {"description_data": [
                    {"lang": "es", "value": "descripcion"},
                    {"lang": "en", "value": "Remote code execution."}
                ]}
            },
            "configurations": {"nodes": [{"cpe_match": [
                {"vulnerable": true, "cpe23Uri": "cpe:2.3:a:vendor:product:*:*:*:*:*:*:*:*", "versionEndIncluding": "2.14.1"},
                {"vulnerable": false, "cpe23Uri": "cpe:2.3:o:os:os:1.0:*:*:*:*:*:*:*"}
            ]}]},
            "impact": impact,
            "publishedDate": "2021-12-10T10:15Z"
        })
    }

    fn parse_item(value: serde_json::Value) -> CveItem {
        serde_json::from_value(value).unwrap()
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<WebhookPayload>>,
        fail_first: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, payload: &WebhookPayload) -> Result<(), SenderError> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_first && sent.is_empty() {
                sent.push(WebhookPayload::default());
                return Err(SenderError::SendFailed("boom".into()));
            }
            sent.push(payload.clone());
            Ok(())
        }
    }

    #[test]
    fn test_criticality_bands() {
        assert_eq!(criticality(10.0).label, "Critical");
        assert_eq!(criticality(9.0).color, 11141375);
        assert_eq!(criticality(8.9).label, "High");
        assert_eq!(criticality(7.0).color, 16711680);
        assert_eq!(criticality(6.9).label, "Medium");
        assert_eq!(criticality(4.0).color, 16746496);
        assert_eq!(criticality(3.9).label, "Low");
        assert_eq!(criticality(0.0).color, 16776960);
    }

    #[test]
    fn test_feed_timestamp_format() {
        let now = Utc.with_ymd_and_hms(2021, 12, 16, 1, 2, 3).unwrap();
        assert_eq!(feed_timestamp(now), "2021-12-16T01:02:03:000 UTC");
    }

    #[test]
    fn test_trim_wildcards() {
        assert_eq!(trim_wildcards("cpe:2.3:a:v:p:*:*:*"), "cpe:2.3:a:v:p");
        assert_eq!(trim_wildcards("cpe:2.3:a:v:p:1.0"), "cpe:2.3:a:v:p:1.0");
    }

    #[test]
    fn test_build_alert() {
        let embed = build_alert(&parse_item(item_json("CVE-2021-44228", Some(10.0)))).unwrap();

        assert_eq!(embed.title, "CVE-2021-44228");
        assert_eq!(
            embed.description,
            "Remote code execution.\n\n_CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H_"
        );
        assert_eq!(embed.url.as_deref(), Some("https://nvd.nist.gov/vuln/detail/CVE-2021-44228"));
        assert_eq!(embed.color, Some(11141375));
        assert_eq!(embed.author.as_ref().unwrap().name, "10.0 - Critical");
        assert_eq!(embed.footer.as_ref().unwrap().text, "Assigned by cve@mitre.org");
        assert_eq!(embed.timestamp.as_deref(), Some("2021-12-10T10:15Z"));

        assert_eq!(embed.fields.len(), 2);
        assert_eq!(embed.fields[0].name, "CPE");
        assert_eq!(embed.fields[0].value, "`cpe:2.3:a:vendor:product` <= 2.14.1\n");
        assert_eq!(embed.fields[1].name, "References");
        assert!(
            embed.fields[1]
                .value
                .starts_with("[vendor.example/advisory](https://vendor.example/advisory)\n\n")
        );
        assert!(embed.fields[1].value.contains("https://www.cvedetails.com/cve/CVE-2021-44228"));
    }

    #[test]
    fn test_unscored_advisory_is_skipped() {
        assert!(build_alert(&parse_item(item_json("CVE-2021-0001", None))).is_none());
    }

    #[tokio::test]
    async fn test_poll_follows_pages_and_advances_cursor() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/json/cves/1.0/"))
            .and(query_param("modStartDate", "2021-12-15T23:00:00:000 UTC"))
            .and(query_param("startIndex", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultsPerPage": 2, "startIndex": 0, "totalResults": 3,
                "result": {"CVE_Items": [
                    item_json("CVE-1", Some(9.8)),
                    item_json("CVE-2", None)
                ]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/json/cves/1.0/"))
            .and(query_param("startIndex", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultsPerPage": 2, "startIndex": 2, "totalResults": 3,
                "result": {"CVE_Items": [item_json("CVE-3", Some(5.0))]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = CveFeed::new(&mock_server.uri()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut state = CveState {
            last: "2021-12-15T23:00:00:000 UTC".to_string(),
            webhook: "https://hooks.example/1".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2021, 12, 16, 1, 0, 0).unwrap();

        let summary = poll(&mut state, &feed, &notifier, now).await.unwrap();

        assert_eq!(
            summary,
            CveRunSummary {
                fetched: 3,
                posted: 2,
                skipped: 1,
                malformed: 0,
                failed: 0
            }
        );
        assert_eq!(state.last, "2021-12-16T01:00:00:000 UTC");
        let sent = notifier.sent.lock().unwrap();
        let titles: Vec<&str> = sent.iter().map(|p| p.embeds[0].title.as_str()).collect();
        assert_eq!(titles, vec!["CVE-1", "CVE-3"]);
    }

    #[tokio::test]
    async fn test_post_failure_does_not_stop_run() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultsPerPage": 2, "startIndex": 0, "totalResults": 2,
                "result": {"CVE_Items": [
                    item_json("CVE-1", Some(9.8)),
                    item_json("CVE-2", Some(7.5))
                ]}
            })))
            .mount(&mock_server)
            .await;

        let feed = CveFeed::new(&mock_server.uri()).unwrap();
        let notifier = RecordingNotifier {
            fail_first: true,
            ..Default::default()
        };
        let mut state = CveState {
            last: "2021-12-15T23:00:00:000 UTC".to_string(),
            webhook: "https://hooks.example/1".to_string(),
        };

        let summary = poll(&mut state, &feed, &notifier, Utc::now()).await.unwrap();
        assert_eq!(summary.posted, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_malformed_item_does_not_sink_page() {
        let mut broken = item_json("CVE-2", Some(7.5));
        broken["cve"].as_object_mut().unwrap().remove("references");

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultsPerPage": 2, "startIndex": 0, "totalResults": 2,
                "result": {"CVE_Items": [item_json("CVE-1", Some(9.8)), broken]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = CveFeed::new(&mock_server.uri()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut state = CveState {
            last: "2021-12-15T23:00:00:000 UTC".to_string(),
            webhook: "https://hooks.example/1".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2021, 12, 16, 1, 0, 0).unwrap();

        let summary = poll(&mut state, &feed, &notifier, now).await.unwrap();

        assert_eq!(
            summary,
            CveRunSummary {
                fetched: 2,
                posted: 1,
                skipped: 0,
                malformed: 1,
                failed: 0
            }
        );
        assert_eq!(state.last, "2021-12-16T01:00:00:000 UTC");
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].embeds[0].title, "CVE-1");
    }

    #[tokio::test]
    async fn test_error_status_keeps_cursor() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let feed = CveFeed::new(&mock_server.uri()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut state = CveState {
            last: "2021-12-15T23:00:00:000 UTC".to_string(),
            webhook: "https://hooks.example/1".to_string(),
        };

        let result = poll(&mut state, &feed, &notifier, Utc::now()).await;
        assert!(matches!(result, Err(CveError::Status(503))));
        assert_eq!(state.last, "2021-12-15T23:00:00:000 UTC");
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_window() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultsPerPage": 0, "startIndex": 0, "totalResults": 0,
                "result": {"CVE_Items": []}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = CveFeed::new(&mock_server.uri()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut state = CveState {
            last: "2021-12-15T23:00:00:000 UTC".to_string(),
            webhook: "https://hooks.example/1".to_string(),
        };

        let summary = poll(&mut state, &feed, &notifier, Utc::now()).await.unwrap();
        assert_eq!(summary, CveRunSummary::default());
    }
}
