use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;
use url::Url;

/// Hosts that are never audited, whatever the input file says.
const EXEMPT_SUFFIXES: &[&str] = &[".gov.cn", ".edu.cn"];

/// Normalize one line of a target list into an auditable URL.
///
/// Returns `None` for blank lines, comments, unparseable URLs and exempt
/// hosts. A line without a scheme gets `http://` prepended.
pub fn parse_target_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let candidate = if line.starts_with("http://") || line.starts_with("https://") {
        line.to_string()
    } else {
        format!("http://{line}")
    };

    let url = match Url::parse(&candidate) {
        Ok(url) => url,
        Err(e) => {
            warn!("skipping unparseable target {line:?}: {e}");
            return None;
        }
    };

    let host = url.host_str()?;
    if EXEMPT_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
        warn!("skipping exempt host {host}");
        return None;
    }

    Some(url.to_string())
}

/// Load a newline-delimited target file, dropping everything
/// `parse_target_line` rejects.
pub fn load_targets_from_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading target list {}", path.display()))?;
    Ok(raw.lines().filter_map(parse_target_line).collect())
}
