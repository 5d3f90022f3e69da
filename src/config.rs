//! Runtime configuration read from the process environment (spec.md §6
//! "Environment variables consumed").
//!
//! Unlike the teacher's `figment`-backed `Config`, this crate's ambient
//! settings are a handful of scalars, so they're read straight off
//! `std::env` rather than pulling in a layered-config crate the teacher
//! needs for its much larger YAML/backends surface (see DESIGN.md).

use std::time::Duration;

const DEFAULT_TOOL_SPECS_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_TOOL_SELECTION_TTL: Duration = Duration::from_secs(2 * 60);
const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Ambient client settings sourced from environment variables, with the
/// defaults spec.md §6 documents.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TTL for CodeMode's rendered tool-specs cache.
    pub tool_specs_cache_ttl: Duration,
    /// TTL for CodeMode's tool-selection cache.
    pub tool_selection_cache_ttl: Duration,
    /// Default `limit` used by `search` when a caller doesn't specify one.
    pub search_tools_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tool_specs_cache_ttl: DEFAULT_TOOL_SPECS_TTL,
            tool_selection_cache_ttl: DEFAULT_TOOL_SELECTION_TTL,
            search_tools_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Read settings from the process environment, falling back to spec
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            tool_specs_cache_ttl: read_duration_env(
                "UTCP_TOOL_SPECS_CACHE_TTL",
                DEFAULT_TOOL_SPECS_TTL,
            ),
            tool_selection_cache_ttl: read_duration_env(
                "UTCP_TOOL_SELECTION_CACHE_TTL",
                DEFAULT_TOOL_SELECTION_TTL,
            ),
            search_tools_limit: std::env::var("utcp_search_tools_limit")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
        }
    }
}

fn read_duration_env(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}

/// Parse a duration string shaped like `5m`, `30s`, `1h`, or a bare integer
/// number of seconds (spec.md §6: "duration strings like `5m` or bare
/// seconds").
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (number, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let n: u64 = number.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}
