//! Folds decoded export records into per-key tallies.
//!
//! Each accumulator keeps its keys in first-seen order and only ever grows.

use crate::{
    error::{ExportError, Result},
    report::{ReportRow, ReportSource},
};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

pub trait Accumulator {
    type Record: DeserializeOwned;

    fn fold(&mut self, record: Self::Record);

    /// Number of distinct keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Asset tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AssetRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagStats {
    pub count: u64,
}

/// Tag name -> number of assets carrying it.
#[derive(Debug, Clone, Default)]
pub struct TagFrequency {
    tags: IndexMap<String, TagStats>,
}

impl TagFrequency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&TagStats> {
        self.tags.get(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagStats)> {
        self.tags.iter()
    }
}

impl Accumulator for TagFrequency {
    type Record = AssetRecord;

    fn fold(&mut self, record: AssetRecord) {
        for tag in record.tags {
            if let Some(stats) = self.tags.get_mut(&tag) {
                stats.count += 1;
            } else {
                debug!("new asset tag: {tag} (asset {:?})", record.id);
                self.tags.insert(tag, TagStats { count: 1 });
            }
        }
    }

    fn len(&self) -> usize {
        self.tags.len()
    }
}

impl ReportSource for TagFrequency {
    fn header(&self) -> Vec<&'static str> {
        vec!["Asset Tag Name", "Asset Tag Count"]
    }

    fn rows(&self) -> Vec<ReportRow> {
        self.tags
            .iter()
            .map(|(tag, stats)| ReportRow::new(stats.count, vec![tag.clone(), stats.count.to_string()]))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Vulnerability custom fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldsRecord {
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldEntry {
    pub name: String,
    #[serde(default)]
    pub custom_field_definition_id: Option<u64>,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomFieldStats {
    pub definition_id: Option<u64>,
    /// Non-null occurrences.
    pub count: u64,
    /// Distinct non-null values, first-seen order.
    pub values: Vec<String>,
}

/// Custom field name -> definition id, occurrence count and distinct values.
#[derive(Debug, Clone, Default)]
pub struct CustomFieldDictionary {
    fields: IndexMap<String, CustomFieldStats>,
}

impl CustomFieldDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CustomFieldStats> {
        self.fields.get(name)
    }

    pub fn observe(&mut self, entry: CustomFieldEntry) {
        let definition_id = entry.custom_field_definition_id;
        if let Some(known) = self.fields.get(&entry.name) {
            if known.definition_id != definition_id {
                warn!(
                    "IDs for custom field {} do not match: {:?}, {:?}",
                    entry.name, known.definition_id, definition_id
                );
            }
        }
        let stats = self
            .fields
            .entry(entry.name)
            .or_insert_with(|| CustomFieldStats {
                definition_id,
                ..Default::default()
            });

        let value = match entry.value {
            serde_json::Value::Null => return,
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        stats.count += 1;
        if !stats.values.contains(&value) {
            stats.values.push(value);
        }
    }
}

impl Accumulator for CustomFieldDictionary {
    type Record = CustomFieldsRecord;

    fn fold(&mut self, record: CustomFieldsRecord) {
        for entry in record.custom_fields {
            self.observe(entry);
        }
    }

    fn len(&self) -> usize {
        self.fields.len()
    }
}

impl ReportSource for CustomFieldDictionary {
    fn header(&self) -> Vec<&'static str> {
        vec![
            "Custom Field",
            "Custom Field ID",
            "Field Count",
            "Value Count",
            "Custom Field Values",
        ]
    }

    fn rows(&self) -> Vec<ReportRow> {
        self.fields
            .iter()
            .map(|(name, stats)| {
                ReportRow::new(
                    stats.count,
                    vec![
                        name.clone(),
                        stats
                            .definition_id
                            .map(|id| id.to_string())
                            .unwrap_or_default(),
                        stats.count.to_string(),
                        stats.values.len().to_string(),
                        stats.values.join(", "),
                    ],
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CVE ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CveRecord {
    #[serde(default)]
    pub cve_id: Option<String>,
}

/// CVE id -> number of vulnerabilities referencing it. Ids that do not match
/// the pattern (informational findings, vendor ids) are skipped.
#[derive(Debug, Clone)]
pub struct CveCounter {
    pattern: Regex,
    counts: IndexMap<String, u64>,
}

impl CveCounter {
    pub fn new(id_pattern: &str) -> Result<Self> {
        let pattern = Regex::new(id_pattern)
            .map_err(|e| ExportError::Config(format!("invalid cve.id_pattern: {e}")))?;
        Ok(Self {
            pattern,
            counts: IndexMap::new(),
        })
    }

    pub fn count(&self, cve_id: &str) -> u64 {
        self.counts.get(cve_id).copied().unwrap_or(0)
    }
}

impl Accumulator for CveCounter {
    type Record = CveRecord;

    fn fold(&mut self, record: CveRecord) {
        let Some(cve_id) = record.cve_id else {
            return;
        };
        if !self.pattern.is_match(&cve_id) {
            return;
        }
        *self.counts.entry(cve_id).or_insert(0) += 1;
    }

    fn len(&self) -> usize {
        self.counts.len()
    }
}

impl ReportSource for CveCounter {
    fn header(&self) -> Vec<&'static str> {
        vec!["CVE", "CVE Count"]
    }

    fn rows(&self) -> Vec<ReportRow> {
        self.counts
            .iter()
            .map(|(cve, count)| ReportRow::new(*count, vec![cve.clone(), count.to_string()]))
            .collect()
    }
}
