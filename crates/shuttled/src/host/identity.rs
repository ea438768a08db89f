//! Machine and session identity reported to the core and the UI.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const MACHINE_ID_SOURCES: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// A stable, anonymised machine identifier.
///
/// The first readable system machine id is hashed with SHA-256 so the raw
/// value never leaves the host. Without one, `fallback` is hashed instead.
#[must_use]
pub fn machine_id(fallback: &str) -> String {
    let raw = MACHINE_ID_SOURCES
        .iter()
        .find_map(|source| read_trimmed(Path::new(source)))
        .unwrap_or_else(|| fallback.to_owned());
    hash(&raw)
}

fn read_trimmed(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn hash(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// The current UTC time as RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
