use chrono::{DateTime, Utc};

pub const ASSET_PREFIX: &str = "tibia-x64-v";
pub const ASSET_SUFFIX: &str = ".tar.gz";

/// Tag of the release that carries a launcher version.
#[must_use]
pub fn release_tag(launcher_version: &str) -> String {
    format!("v{launcher_version}")
}

/// Name of the single asset attached to a launcher release.
#[must_use]
pub fn asset_filename(launcher_version: &str) -> String {
    format!("{ASSET_PREFIX}{launcher_version}{ASSET_SUFFIX}")
}

#[must_use]
pub fn is_launcher_asset(name: &str) -> bool {
    name.starts_with(ASSET_PREFIX) && name.ends_with(ASSET_SUFFIX)
}

#[must_use]
pub fn release_notes(client_version: &str, launcher_version: &str) -> String {
    format!(
        "This release contains the Tibia client version {client_version} and the launcher version {launcher_version}."
    )
}

/// Release notes followed by the provenance of the uploaded binary.
///
/// A `last-modified` value that is a valid HTTP-date is rendered as an
/// IMF-fixdate; any other header text is kept as sent.
#[must_use]
pub fn provenance_notes(template: &str, last_modified: Option<&str>, snapshot_url: &str) -> String {
    let published = match last_modified {
        Some(raw) => parse_http_date(raw).map_or_else(|| raw.trim().to_owned(), format_http_date),
        None => "an unknown date".to_owned(),
    };
    format!(
        "{template}\n\nThis file was published on {published}\n\nA snapshot of the download page is available at {snapshot_url} for integrity checking."
    )
}

/// Parse an HTTP-date header value such as `Tue, 15 Nov 1994 08:12:31 GMT`.
#[must_use]
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[must_use]
pub fn format_http_date(instant: DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
