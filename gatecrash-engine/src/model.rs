use serde::{Deserialize, Serialize};

/// One entry of the CMS signature table. Matched against the raw page body
/// by keyword containment; first match in table order wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsSignature {
    pub name: String,
    pub keyword: String,
    #[serde(default)]
    pub success_marker: Option<String>,
    #[serde(default)]
    pub death_marker: Option<String>,
    #[serde(default)]
    pub sql_injection_eligible: bool,
    #[serde(default)]
    pub advisory_note: Option<String>,
}

/// The signature that matched a concrete target.
#[derive(Debug, Clone)]
pub struct CmsProfile {
    pub name: String,
    pub matched_keyword: String,
    pub success_marker: Option<String>,
    pub death_marker: Option<String>,
    pub sql_injection_eligible: bool,
    pub advisory_note: Option<String>,
}

impl CmsProfile {
    pub fn from_signature(sig: &CmsSignature) -> Self {
        Self {
            name: sig.name.clone(),
            matched_keyword: sig.keyword.clone(),
            success_marker: sig.success_marker.clone().filter(|m| !m.is_empty()),
            death_marker: sig.death_marker.clone().filter(|m| !m.is_empty()),
            sql_injection_eligible: sig.sql_injection_eligible,
            advisory_note: sig.advisory_note.clone().filter(|n| !n.is_empty()),
        }
    }
}

/// Everything the analyzer learned about one login form. Built once per
/// target and read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: String,
    pub submit_path: String,
    pub username_field: String,
    pub password_field: String,
    /// All form inputs with their default values, in document order.
    /// Includes the username/password fields; their values are replaced
    /// per attempt.
    pub form_fields: Vec<(String, String)>,
    pub captcha_field: Option<String>,
    pub captcha_image_url: Option<String>,
    pub cms_profile: Option<CmsProfile>,
}

impl Target {
    /// Form body for one attempt: the captured defaults with the trial
    /// credentials filled into the two classified fields.
    pub fn attempt_fields(&self, username: &str, password: &str) -> Vec<(String, String)> {
        self.form_fields
            .iter()
            .map(|(name, value)| {
                if *name == self.username_field {
                    (name.clone(), username.to_string())
                } else if *name == self.password_field {
                    (name.clone(), password.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

/// Placeholder inside a password candidate replaced with the attempt's
/// username before send.
pub const USER_PLACEHOLDER: &str = "{user}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub username: String,
    pub password: String,
}

impl Candidate {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Password with the `{user}` placeholder substituted.
    pub fn effective_password(&self) -> String {
        self.password.replace(USER_PLACEHOLDER, &self.username)
    }
}

/// Byte length of the response to a known-invalid login. The null
/// hypothesis for blind differencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub fingerprint: usize,
}

/// Classification of one credential attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Found { username: String, password: String },
    Inconclusive,
    /// A CMS death marker fired; abandon the target with no success.
    Stop,
}

/// Per-target result surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Cracked { username: String, password: String },
    NotFound,
    Timeout,
    Failed(String),
}

/// Ephemeral per-attempt telemetry behind the trial progress lines.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub number: u64,
    pub total: u64,
    pub username: String,
    pub password: String,
}

impl AttemptRecord {
    pub fn progress_line(&self, url: &str) -> String {
        format!(
            "[*] {url} progress ({}/{}) trying: {} {}",
            self.number, self.total, self.username, self.password
        )
    }
}
