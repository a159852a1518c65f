use serde::Deserialize;

/// One page of the NVD `cves/1.0` search response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvePage {
    #[serde(default)]
    pub start_index: usize,
    pub total_results: usize,
    #[serde(default)]
    pub result: Option<CveResult>,
}

/// Items stay raw here so one malformed entry cannot fail the whole page.
#[derive(Debug, Clone, Deserialize)]
pub struct CveResult {
    #[serde(rename = "CVE_Items", default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveItem {
    pub cve: Cve,
    #[serde(default)]
    pub configurations: Option<Configurations>,
    #[serde(default)]
    pub impact: Option<Impact>,
    pub published_date: String,
}

impl CveItem {
    pub fn id(&self) -> &str {
        &self.cve.meta.id
    }

    pub fn cvss_v3(&self) -> Option<&CvssV3> {
        self.impact
            .as_ref()?
            .base_metric_v3
            .as_ref()
            .map(|metric| &metric.cvss_v3)
    }

    pub fn english_description(&self) -> &str {
        self.cve
            .description
            .description_data
            .iter()
            .rev()
            .find(|d| d.lang == "en")
            .map(|d| d.value.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cve {
    #[serde(rename = "CVE_data_meta")]
    pub meta: CveMeta,
    pub references: References,
    pub description: Descriptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CveMeta {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ASSIGNER", default)]
    pub assigner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct References {
    #[serde(default)]
    pub reference_data: Vec<Reference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Descriptions {
    #[serde(default)]
    pub description_data: Vec<Description>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Description {
    pub lang: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configurations {
    #[serde(default)]
    pub nodes: Vec<ConfigurationNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationNode {
    #[serde(default)]
    pub cpe_match: Vec<CpeMatch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpeMatch {
    pub vulnerable: bool,
    #[serde(rename = "cpe23Uri")]
    pub cpe23_uri: String,
    #[serde(default)]
    pub version_end_including: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Impact {
    #[serde(rename = "baseMetricV3", default)]
    pub base_metric_v3: Option<BaseMetricV3>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseMetricV3 {
    #[serde(rename = "cvssV3")]
    pub cvss_v3: CvssV3,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssV3 {
    pub base_score: f64,
    pub vector_string: String,
}
