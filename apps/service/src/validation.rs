use anyhow::{Result, anyhow};
use url::Url;

/// Longest accepted check frequency (one week)
const MAX_FREQUENCY_SECONDS: u64 = 7 * 24 * 3600;

/// Validation results with specific error messages
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    pub fn to_result(&self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(anyhow!(self.error.clone().unwrap_or_else(|| "Validation failed".to_string())))
        }
    }
}

/// Prefix `https://` when the user typed a bare host
pub fn normalize_site_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("URL cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none_or(str::is_empty) {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => ValidationResult::err(format!("Invalid URL: {e}")),
    }
}

/// Validate check frequency in seconds
pub fn validate_frequency(frequency: u64) -> ValidationResult {
    if frequency == 0 {
        return ValidationResult::err("Frequency must be at least 1 second");
    }

    if frequency > MAX_FREQUENCY_SECONDS {
        return ValidationResult::err(format!(
            "Frequency too long: {frequency} seconds (maximum: {MAX_FREQUENCY_SECONDS})"
        ));
    }

    ValidationResult::ok()
}

/// Validate alert threshold (consecutive failures)
pub fn validate_alert_threshold(threshold: u32) -> ValidationResult {
    if threshold == 0 {
        return ValidationResult::err("Alert threshold must be at least 1");
    }
    ValidationResult::ok()
}

/// Loose sanity check on an alert address; delivery is someone else's job
pub fn validate_alert_email(email: &str) -> ValidationResult {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => ValidationResult::ok(),
        _ => ValidationResult::err(format!("Invalid alert email '{email}'")),
    }
}
