use seglabel_join::JoinSummary;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::Tabled;

/// Output for join command
#[derive(Debug, Serialize)]
pub struct JoinOutput {
    pub dry_run: bool,
    #[serde(flatten)]
    pub summary: JoinSummary,
}

/// Output for inspect command
#[derive(Debug, Serialize)]
pub struct InspectOutput {
    pub path: String,
    pub format: String,
    pub name: String,
    pub feature_count: usize,
    pub geometry_types: BTreeMap<String, usize>,
    pub malformed_geometries: usize,
    pub has_crs: bool,
    pub fields: Vec<FieldRow>,
}

#[derive(Debug, Serialize, Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub name: String,
    #[tabled(rename = "Type")]
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Two-column row for human summaries
#[derive(Debug, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl SummaryRow {
    pub fn new(metric: impl Into<String>, value: impl ToString) -> Self {
        Self { metric: metric.into(), value: value.to_string() }
    }
}
