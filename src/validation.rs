use regex::Regex;

use crate::error::SyncError;
use crate::zone::{ApiServer, Zone};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is empty")]
    Empty,
    #[error("name too short (min 3 characters)")]
    TooShort,
    #[error("name too long (max 253 characters)")]
    TooLong,
    #[error("label too long (max 63 characters)")]
    LabelTooLong,
    #[error("only alphanumeric chars, hyphens and dots allowed")]
    InvalidCharacters,
    #[error("zone name must end with a dot")]
    MissingTrailingDot,
}

lazy_static::lazy_static! {
    /// Dot-terminated labels of alphanumerics and '-', not starting with '-'
    static ref ZONE_NAME_RE: Regex = Regex::new(r"^(?:[a-zA-Z0-9][a-zA-Z0-9\-]{0,62}\.)*$").unwrap();
    static ref LABEL_INVALID_RE: Regex = Regex::new(r"[^a-z0-9-]+").unwrap();
}

pub fn validate_zone_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }
    if name.len() < 3 {
        return Err(ValidationError::TooShort);
    }
    if name.len() > 254 {
        return Err(ValidationError::TooLong);
    }
    if !name.ends_with('.') {
        return Err(ValidationError::MissingTrailingDot);
    }
    if !ZONE_NAME_RE.is_match(name) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

/// Validate a hostname, with or without trailing dot.
pub fn validate_fqdn(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if trimmed.len() > 253 {
        return Err(ValidationError::TooLong);
    }
    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err(ValidationError::Empty);
        }
        if label.len() > 63 {
            return Err(ValidationError::LabelTooLong);
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') || label.starts_with('-') {
            return Err(ValidationError::InvalidCharacters);
        }
    }
    Ok(())
}

/// Turn arbitrary inventory text into a single DNS label.
///
/// Returns an empty string when nothing usable is left.
pub fn make_dns_label(name: &str) -> String {
    let lowered = name.trim().to_ascii_lowercase();
    let replaced = LABEL_INVALID_RE.replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches('-');
    let mut label: String = trimmed.chars().take(63).collect();
    while label.ends_with('-') {
        label.pop();
    }
    label
}

/// Sanitise every label of a dotted name.
pub fn make_dns_name(name: &str) -> String {
    name.trim_end_matches('.')
        .split('.')
        .map(make_dns_label)
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

pub fn validate_server(server: &ApiServer) -> Result<(), SyncError> {
    if server.name.trim().is_empty() {
        return Err(SyncError::configuration("API server name must not be empty"));
    }
    let url = reqwest::Url::parse(&server.api_url)
        .map_err(|e| SyncError::configuration(format!("invalid API url '{}': {e}", server.api_url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SyncError::configuration(format!(
            "API url '{}' must use http or https",
            server.api_url
        )));
    }
    if server.api_token.is_empty() {
        return Err(SyncError::configuration(format!(
            "API server '{}' has no token",
            server.name
        )));
    }
    Ok(())
}

/// Check one zone against its siblings.
pub fn validate_zone(zone: &Zone, others: &[Zone]) -> Result<(), SyncError> {
    validate_zone_name(&zone.name)
        .map_err(|e| SyncError::configuration(format!("zone '{}': {e}", zone.name)))?;

    if zone.default_ttl == Some(0) {
        return Err(SyncError::configuration(format!(
            "zone '{}': default TTL must be greater than zero",
            zone.name
        )));
    }
    if zone.sync_interval_minutes == Some(0) {
        return Err(SyncError::configuration(format!(
            "zone '{}': sync interval must be at least one minute",
            zone.name
        )));
    }

    for other in others.iter().filter(|o| o.id != zone.id) {
        if other.name.eq_ignore_ascii_case(&zone.name) {
            return Err(SyncError::configuration(format!(
                "zone '{}' already exists",
                zone.name
            )));
        }
        if zone.is_default && other.is_default {
            return Err(SyncError::configuration(format!(
                "only one zone can be set as default ('{}' already is)",
                other.name
            )));
        }
    }

    for affix in [&zone.naming.label_prefix, &zone.naming.label_suffix] {
        if !affix.is_empty() && make_dns_label(affix) != affix.to_ascii_lowercase() {
            return Err(SyncError::configuration(format!(
                "zone '{}': naming affix '{affix}' is not a valid label fragment",
                zone.name
            )));
        }
    }

    Ok(())
}

/// A zone can only be synced when it has somewhere to sync to.
pub fn validate_syncable(zone: &Zone, servers: &[ApiServer]) -> Result<(), SyncError> {
    if !servers.iter().any(|s| s.enabled) {
        return Err(SyncError::configuration(format!(
            "no valid servers found for zone {}",
            zone.name
        )));
    }
    for server in servers.iter().filter(|s| s.enabled) {
        validate_server(server)?;
    }
    Ok(())
}
