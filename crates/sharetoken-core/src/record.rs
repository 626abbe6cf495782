//! Input and outcome record types.

use serde::{Deserialize, Serialize};

/// Input column holding the subject (applicant) id.
pub const COL_SUBJECT_ID: &str = "applicantId";
/// Input column holding the correlation (external) id, the merge key.
pub const COL_CORRELATION_ID: &str = "externalId";
/// Input column holding the level label.
pub const COL_LEVEL_LABEL: &str = "applicantLevel";

/// Columns every input file must carry.
pub const REQUIRED_INPUT_COLUMNS: [&str; 3] = [COL_SUBJECT_ID, COL_CORRELATION_ID, COL_LEVEL_LABEL];

/// Output header, in file order.
pub const OUTPUT_COLUMNS: [&str; 6] = [
    "externalId",
    "shareToken",
    "applicantLevel",
    "applicantId",
    "forClientId",
    "error",
];

/// One row of the input file. Values are trimmed; absent cells are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InputRecord {
    #[serde(rename = "applicantId", default, deserialize_with = "trimmed")]
    pub subject_id: String,
    #[serde(rename = "externalId", default, deserialize_with = "trimmed")]
    pub correlation_id: String,
    #[serde(rename = "applicantLevel", default, deserialize_with = "trimmed")]
    pub level_label: String,
}

fn trimmed<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.map(|s| s.trim().to_string()).unwrap_or_default())
}

/// Empty cells and "not-a-number" markers left by spreadsheet tooling.
pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("nan")
}

impl InputRecord {
    pub fn new(
        subject_id: impl Into<String>,
        correlation_id: impl Into<String>,
        level_label: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            correlation_id: correlation_id.into(),
            level_label: level_label.into(),
        }
    }

    /// Check required fields; on failure returns the combined message,
    /// e.g. `Missing 'applicantId' value; Missing 'applicantLevel' value`.
    pub fn validate(&self) -> Result<(), String> {
        let problems: Vec<String> = [
            (COL_SUBJECT_ID, &self.subject_id),
            (COL_CORRELATION_ID, &self.correlation_id),
            (COL_LEVEL_LABEL, &self.level_label),
        ]
        .iter()
        .filter(|(_, value)| is_missing(value))
        .map(|(column, _)| format!("Missing '{column}' value"))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    /// Field value with "not-a-number" markers blanked out.
    fn clean(value: &str) -> String {
        if is_missing(value) {
            String::new()
        } else {
            value.to_string()
        }
    }
}

/// One row of the output file, keyed by `correlation_id`.
///
/// An empty `error_message` means success; the token column is never
/// consulted for that decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    #[serde(rename = "externalId", default)]
    pub correlation_id: String,
    #[serde(rename = "shareToken", default)]
    pub token: String,
    #[serde(rename = "applicantLevel", default)]
    pub level_label: String,
    #[serde(rename = "applicantId", default)]
    pub subject_id: String,
    #[serde(rename = "forClientId", default)]
    pub client_id: String,
    #[serde(rename = "error", default)]
    pub error_message: String,
}

impl OutcomeRecord {
    pub fn success(input: &InputRecord, token: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            correlation_id: input.correlation_id.clone(),
            token: token.into(),
            level_label: input.level_label.clone(),
            subject_id: input.subject_id.clone(),
            client_id: client_id.into(),
            error_message: String::new(),
        }
    }

    pub fn failure(input: &InputRecord, client_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            correlation_id: InputRecord::clean(&input.correlation_id),
            token: String::new(),
            level_label: InputRecord::clean(&input.level_label),
            subject_id: InputRecord::clean(&input.subject_id),
            client_id: client_id.into(),
            error_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.trim().is_empty()
    }

    /// Merge key, whitespace-insensitive.
    pub fn key(&self) -> &str {
        self.correlation_id.trim()
    }
}
