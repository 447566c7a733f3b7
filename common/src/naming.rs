//! Artifact naming.
//!
//! Two forms are produced for every job:
//! - an opaque `{uuid}.{ext}` name for the local temporary file, so that
//!   concurrent jobs never share a path;
//! - a reported identifier for the upload collaborator, which is either the
//!   opaque name or `{track}/{starttime}_{endtime}.{ext}` derived from a
//!   playback URL such as
//!   `rtsp://nvr:554/Streaming/tracks/101?starttime=...&endtime=...`.

use std::str::FromStr;

use url::Url;
use uuid::Uuid;

use crate::error::NamingError;

/// Index of the track segment in a playback path.
const TRACK_SEGMENT: usize = 2;

/// How the identifier reported to the upload collaborator is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// Always report the opaque local name.
    Opaque,
    /// Report the structural name when the URL carries a time range,
    /// otherwise fall back to the opaque name.
    #[default]
    Structural,
    /// Report the structural name; jobs without one are rejected.
    StructuralRequired,
}

impl FromStr for NamingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opaque" | "uuid" => Ok(Self::Opaque),
            "structural" => Ok(Self::Structural),
            "structural-required" | "structural_required" => Ok(Self::StructuralRequired),
            other => Err(format!("unknown naming strategy {other:?}")),
        }
    }
}

/// A fresh collision-resistant file name.
pub fn opaque_name(extension: &str) -> String {
    format!("{}.{extension}", Uuid::new_v4())
}

/// `{track}/{starttime}_{endtime}.{ext}` from the URL path and query.
pub fn structural_name(url: &str, extension: &str) -> Result<String, NamingError> {
    let parsed = Url::parse(url).map_err(|e| NamingError::InvalidUrl(e.to_string()))?;

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let track = segments
        .get(TRACK_SEGMENT)
        .ok_or(NamingError::MissingSegments {
            expected: TRACK_SEGMENT + 1,
            found: segments.len(),
        })?;

    let param = |name: &'static str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
            .ok_or(NamingError::MissingParam(name))
    };
    let start = param("starttime")?;
    let end = param("endtime")?;

    check_component("track", track)?;
    check_component("starttime", &start)?;
    check_component("endtime", &end)?;

    Ok(format!("{track}/{start}_{end}.{extension}"))
}

/// Each part becomes one path element in the downstream store.  The track
/// is still percent-encoded, so `%` is refused there as well.
fn check_component(name: &'static str, value: &str) -> Result<(), NamingError> {
    let unusable = value.is_empty()
        || value == "."
        || value == ".."
        || value
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | '\\'))
        || (name == "track" && value.contains('%'));
    if unusable {
        return Err(NamingError::InvalidComponent {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Pick the reported identifier for a job whose local file is `local_name`.
pub fn reported_name(
    strategy: NamingStrategy,
    url: &str,
    extension: &str,
    local_name: &str,
) -> Result<String, NamingError> {
    match strategy {
        NamingStrategy::Opaque => Ok(local_name.to_string()),
        NamingStrategy::Structural => match structural_name(url, extension) {
            Ok(name) => Ok(name),
            // A time range that is present but unusable is never papered over.
            Err(e @ NamingError::InvalidComponent { .. }) => Err(e),
            Err(e) => {
                tracing::debug!("Structural naming unavailable ({e}), using {local_name}");
                Ok(local_name.to_string())
            }
        },
        NamingStrategy::StructuralRequired => structural_name(url, extension),
    }
}

// ─── tests ───────────────────────────────────────────────────────────────
