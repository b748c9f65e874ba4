use casewatch_pipeline::RunConfig;
use std::env;
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_UNIT: &str = "unit";
const DEFAULT_MAX_NEW_RECORDS: usize = 10;
const DEFAULT_MAX_ARTIFACT_MB: u64 = 100;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_HISTORY_PATH: &str = "data/history.json";
const DEFAULT_ARTIFACT_DIR: &str = "artifacts/daily";
const DEFAULT_REPORT_PATH: &str = "output/daily_report.json";
const DEFAULT_OUTBOX_DIR: &str = "output/outbox";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub use_tls: bool,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_user: None,
            smtp_pass: None,
            use_tls: true,
        }
    }
}

impl MailSettings {
    /// Names of the variables that must be set before anything can be sent.
    pub fn missing_mandatory(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.from.is_none() {
            missing.push("CASEWATCH_MAIL_FROM");
        }
        if self.to.is_empty() {
            missing.push("CASEWATCH_MAIL_TO");
        }
        if self.smtp_host.is_none() {
            missing.push("CASEWATCH_SMTP_HOST");
        }
        missing
    }

    pub fn has_credentials(&self) -> bool {
        self.smtp_user.is_some() && self.smtp_pass.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub unit: String,
    pub max_new_records: usize,
    pub max_artifact_mb: u64,
    pub history_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub report_path: PathBuf,
    pub baseline_limit: Option<usize>,
    pub outbox_dir: PathBuf,
    pub mail: MailSettings,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            unit: DEFAULT_UNIT.to_string(),
            max_new_records: DEFAULT_MAX_NEW_RECORDS,
            max_artifact_mb: DEFAULT_MAX_ARTIFACT_MB,
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            baseline_limit: None,
            outbox_dir: PathBuf::from(DEFAULT_OUTBOX_DIR),
            mail: MailSettings::default(),
        }
    }
}

impl ReportSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let mail = MailSettings {
            from: get("CASEWATCH_MAIL_FROM"),
            to: get("CASEWATCH_MAIL_TO")
                .map(|raw| split_recipients(&raw))
                .unwrap_or_default(),
            smtp_host: get("CASEWATCH_SMTP_HOST"),
            smtp_port: positive_or_default(
                "CASEWATCH_SMTP_PORT",
                get("CASEWATCH_SMTP_PORT"),
                DEFAULT_SMTP_PORT,
            ),
            smtp_user: get("CASEWATCH_SMTP_USER"),
            smtp_pass: get("CASEWATCH_SMTP_PASS"),
            use_tls: get("CASEWATCH_SMTP_USE_TLS")
                .map(|value| !is_false_flag(&value))
                .unwrap_or(true),
        };

        Self {
            unit: get("CASEWATCH_UNIT").unwrap_or(defaults.unit),
            max_new_records: positive_or_default(
                "CASEWATCH_MAX_NEW_RECORDS",
                get("CASEWATCH_MAX_NEW_RECORDS"),
                DEFAULT_MAX_NEW_RECORDS,
            ),
            max_artifact_mb: positive_or_default(
                "CASEWATCH_MAX_ARTIFACT_MB",
                get("CASEWATCH_MAX_ARTIFACT_MB"),
                DEFAULT_MAX_ARTIFACT_MB,
            ),
            history_path: get("CASEWATCH_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_path),
            artifact_dir: get("CASEWATCH_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            report_path: get("CASEWATCH_REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_path),
            baseline_limit: get("CASEWATCH_BASELINE_LIMIT").and_then(|raw| {
                match raw.parse::<usize>() {
                    Ok(limit) => Some(limit),
                    Err(_) => {
                        warn!(
                            event = "setting_invalid",
                            key = "CASEWATCH_BASELINE_LIMIT",
                            value = %raw
                        );
                        None
                    }
                }
            }),
            outbox_dir: get("CASEWATCH_OUTBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.outbox_dir),
            mail,
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            unit: self.unit.clone(),
            max_new_records: self.max_new_records,
            max_artifact_mb: self.max_artifact_mb,
            history_path: self.history_path.clone(),
            artifact_dir: self.artifact_dir.clone(),
            report_path: self.report_path.clone(),
            baseline_limit: self.baseline_limit,
            ..RunConfig::default()
        }
    }

    /// Effective settings as label/value pairs, password masked.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "(unset)".to_string());
        vec![
            ("unit", self.unit.clone()),
            ("max_new_records", self.max_new_records.to_string()),
            ("max_artifact_mb", self.max_artifact_mb.to_string()),
            ("history_path", self.history_path.display().to_string()),
            ("artifact_dir", self.artifact_dir.display().to_string()),
            ("report_path", self.report_path.display().to_string()),
            (
                "baseline_limit",
                self.baseline_limit
                    .map(|limit| limit.to_string())
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            ("outbox_dir", self.outbox_dir.display().to_string()),
            ("mail_from", optional(&self.mail.from)),
            ("mail_to", self.mail.to.join(", ")),
            ("smtp_host", optional(&self.mail.smtp_host)),
            ("smtp_port", self.mail.smtp_port.to_string()),
            ("smtp_user", optional(&self.mail.smtp_user)),
            (
                "smtp_pass",
                if self.mail.smtp_pass.is_some() {
                    "********".to_string()
                } else {
                    "(unset)".to_string()
                },
            ),
            ("smtp_use_tls", self.mail.use_tls.to_string()),
        ]
    }
}

fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_false_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn positive_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + From<u8> + Copy,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if value >= T::from(1) => value,
        _ => {
            warn!(event = "setting_invalid", key, value = %raw, fallback = "default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> ReportSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ReportSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let loaded = settings(&[]);
        assert_eq!(loaded, ReportSettings::default());
        assert_eq!(
            loaded.mail.missing_mandatory(),
            vec!["CASEWATCH_MAIL_FROM", "CASEWATCH_MAIL_TO", "CASEWATCH_SMTP_HOST"]
        );
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let loaded = settings(&[
            ("CASEWATCH_MAX_NEW_RECORDS", "0"),
            ("CASEWATCH_MAX_ARTIFACT_MB", "lots"),
            ("CASEWATCH_SMTP_PORT", "-1"),
            ("CASEWATCH_BASELINE_LIMIT", "ten"),
        ]);
        assert_eq!(loaded.max_new_records, 10);
        assert_eq!(loaded.max_artifact_mb, 100);
        assert_eq!(loaded.mail.smtp_port, 587);
        assert_eq!(loaded.baseline_limit, None);
    }

    #[test]
    fn explicit_values_are_used() {
        let loaded = settings(&[
            ("CASEWATCH_UNIT", " UNIT/TEST "),
            ("CASEWATCH_MAX_NEW_RECORDS", "25"),
            ("CASEWATCH_MAX_ARTIFACT_MB", "40"),
            ("CASEWATCH_BASELINE_LIMIT", "5"),
            ("CASEWATCH_HISTORY_PATH", "/var/lib/casewatch/history.json"),
            ("CASEWATCH_MAIL_FROM", "reports@example.org"),
            ("CASEWATCH_MAIL_TO", "a@example.org, ,b@example.org,"),
            ("CASEWATCH_SMTP_HOST", "smtp.example.org"),
            ("CASEWATCH_SMTP_PORT", "2525"),
        ]);

        assert_eq!(loaded.unit, "UNIT/TEST");
        assert_eq!(loaded.max_new_records, 25);
        assert_eq!(loaded.max_artifact_mb, 40);
        assert_eq!(loaded.baseline_limit, Some(5));
        assert_eq!(
            loaded.history_path,
            PathBuf::from("/var/lib/casewatch/history.json")
        );
        assert_eq!(loaded.mail.to, vec!["a@example.org", "b@example.org"]);
        assert_eq!(loaded.mail.smtp_port, 2525);
        assert!(loaded.mail.missing_mandatory().is_empty());

        let config = loaded.run_config();
        assert_eq!(config.max_new_records, 25);
        assert_eq!(config.unit, "UNIT/TEST");
    }

    #[test]
    fn tls_is_only_disabled_by_explicit_false() {
        assert!(settings(&[]).mail.use_tls);
        assert!(settings(&[("CASEWATCH_SMTP_USE_TLS", "maybe")]).mail.use_tls);
        assert!(!settings(&[("CASEWATCH_SMTP_USE_TLS", "False")]).mail.use_tls);
        assert!(!settings(&[("CASEWATCH_SMTP_USE_TLS", "0")]).mail.use_tls);
    }

    #[test]
    fn describe_masks_password() {
        let loaded = settings(&[
            ("CASEWATCH_SMTP_USER", "bot"),
            ("CASEWATCH_SMTP_PASS", "hunter2"),
        ]);
        let described = loaded.describe();
        assert!(loaded.mail.has_credentials());
        assert!(described
            .iter()
            .any(|(label, value)| *label == "smtp_pass" && value == "********"));
        assert!(described.iter().all(|(_, value)| !value.contains("hunter2")));
    }
}
