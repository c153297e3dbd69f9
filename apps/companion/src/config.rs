use std::{fs, path::Path, time::Duration};

use client_core::{identity::DEFAULT_EMAIL_DOMAIN, OrphanReplyPolicy, SignupPolicy, ThreadOptions};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "companion.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub gateway_url: String,
    pub request_timeout_secs: u64,
    pub log_filter: String,
    pub email_domain: String,
    pub orphan_reply_policy: OrphanReplyPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8000".into(),
            request_timeout_secs: 60,
            log_filter: "warn".into(),
            email_domain: DEFAULT_EMAIL_DOMAIN.into(),
            orphan_reply_policy: OrphanReplyPolicy::Discard,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn thread_options(&self) -> ThreadOptions {
        ThreadOptions {
            gateway_timeout: self.request_timeout(),
            orphan_reply_policy: self.orphan_reply_policy,
        }
    }

    pub fn signup_policy(&self) -> SignupPolicy {
        SignupPolicy {
            required_email_domain: self.email_domain.clone(),
        }
    }
}

/// Command-line values, applied after file and environment settings.
#[derive(Debug, Default)]
pub struct Overrides {
    pub gateway_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub log_filter: Option<String>,
}

impl Settings {
    pub fn apply_overrides(&mut self, overrides: Overrides, warnings: &mut Vec<String>) {
        if let Some(url) = overrides.gateway_url {
            self.gateway_url = url;
        }
        match overrides.request_timeout_secs {
            Some(0) => warnings.push("ignoring --timeout-secs 0".to_string()),
            Some(secs) => self.request_timeout_secs = secs,
            None => {}
        }
        if let Some(filter) = overrides.log_filter {
            self.log_filter = filter;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    gateway_url: Option<String>,
    request_timeout_secs: Option<u64>,
    log_filter: Option<String>,
    email_domain: Option<String>,
    orphan_reply_policy: Option<OrphanReplyPolicy>,
}

/// Defaults, then `companion.toml` (if present), then environment.
/// Unusable values are skipped and reported in the returned warnings, since
/// logging is not set up yet when settings are loaded.
pub fn load_settings(config_path: &Path) -> (Settings, Vec<String>) {
    let raw = fs::read_to_string(config_path).ok();
    resolve_settings(config_path, raw.as_deref(), |key| std::env::var(key).ok())
}

pub fn resolve_settings(
    config_path: &Path,
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> (Settings, Vec<String>) {
    let mut settings = Settings::default();
    let mut warnings = Vec::new();

    if let Some(raw) = file_contents {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg, config_path, &mut warnings),
            Err(err) => warnings.push(format!("ignoring {}: {err}", config_path.display())),
        }
    }

    if let Some(v) = env("GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Some(v) = env("APP__GATEWAY_URL") {
        settings.gateway_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warnings.push(format!("ignoring APP__REQUEST_TIMEOUT_SECS={v}")),
        }
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }

    if let Some(v) = env("APP__EMAIL_DOMAIN") {
        settings.email_domain = v;
    }

    if let Some(v) = env("APP__ORPHAN_REPLY_POLICY") {
        match v.parse::<OrphanReplyPolicy>() {
            Ok(policy) => settings.orphan_reply_policy = policy,
            Err(err) => warnings.push(format!("ignoring APP__ORPHAN_REPLY_POLICY: {err}")),
        }
    }

    (settings, warnings)
}

fn apply_file(
    settings: &mut Settings,
    file_cfg: FileSettings,
    config_path: &Path,
    warnings: &mut Vec<String>,
) {
    if let Some(v) = file_cfg.gateway_url {
        settings.gateway_url = v;
    }
    match file_cfg.request_timeout_secs {
        Some(0) => warnings.push(format!(
            "ignoring request_timeout_secs = 0 in {}",
            config_path.display()
        )),
        Some(v) => settings.request_timeout_secs = v,
        None => {}
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.email_domain {
        settings.email_domain = v;
    }
    if let Some(v) = file_cfg.orphan_reply_policy {
        settings.orphan_reply_policy = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
