use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)\((\d+)\)\s*$").expect("valid suffix regex"));

/// Return a path that does not exist yet, derived from `path` by appending
/// an incrementing ` (n)` suffix before the extension:
/// `report.pdf` → `report (1).pdf` → `report (2).pdf`.
pub fn make_unused_name(path: impl AsRef<Path>) -> PathBuf {
    let mut candidate = path.as_ref().to_path_buf();
    while candidate.exists() {
        let dir = candidate
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = candidate
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = match NUMBERED.captures(&stem) {
            Some(caps) => {
                let n: u64 = caps[2].parse().unwrap_or(0);
                format!("{} ({}){}", caps[1].trim_end(), n + 1, ext)
            }
            None => format!("{} (1){}", stem.trim_end(), ext),
        };
        candidate = dir.join(name);
    }
    candidate
}
