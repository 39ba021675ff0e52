use super::Sheet;
use crate::fsutil::make_unused_name;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A named collection of sheets, persisted as one JSON file.
///
/// Sheets are created lazily at a fixed logical position on first use:
/// `log` at 0, `jobs` at 1, `lots` at 2. The workbook lives entirely in
/// memory during a run; `checkpoint` flushes it after each completed unit of
/// work so a crash loses at most the in-flight one.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: Vec<NamedSheet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedSheet {
    name: String,
    sheet: Sheet,
}

impl Workbook {
    /// Load the workbook from `path`, or start an empty one if the file is
    /// not there yet.
    pub fn load(path: &Path) -> Result<Workbook> {
        if !path.exists() {
            return Ok(Workbook::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading workbook {}", path.display()))?;
        let mut wb: Workbook = serde_json::from_str(&text)
            .with_context(|| format!("parsing workbook {}", path.display()))?;
        for named in &mut wb.sheets {
            named.sheet.restore();
        }
        Ok(wb)
    }

    /// Get the named sheet, creating it at `position` (clamped to the
    /// current sheet count) on first use.
    pub fn sheet_mut(&mut self, name: &str, position: usize) -> &mut Sheet {
        if let Some(i) = self.sheets.iter().position(|s| s.name == name) {
            return &mut self.sheets[i].sheet;
        }
        let at = position.min(self.sheets.len());
        self.sheets.insert(
            at,
            NamedSheet {
                name: name.to_string(),
                sheet: Sheet::new(),
            },
        );
        &mut self.sheets[at].sheet
    }

    pub fn log(&mut self) -> &mut Sheet {
        self.sheet_mut("log", 0)
    }

    pub fn jobs(&mut self) -> &mut Sheet {
        self.sheet_mut("jobs", 1)
    }

    pub fn lots(&mut self) -> &mut Sheet {
        self.sheet_mut("lots", 2)
    }

    /// Read-only lookup, mainly for assertions.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name).map(|s| &s.sheet)
    }

    /// Serialize to `path` via a `.tmp` sibling renamed into place, so a
    /// crash mid-write never clobbers the previous file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing workbook")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Save to `path`; if that fails, retry under a non-colliding fallback
    /// name. Returns the path actually written.
    pub fn save_with_fallback(&self, path: &Path) -> Result<PathBuf> {
        match self.save(path) {
            Ok(()) => Ok(path.to_path_buf()),
            Err(err) => {
                let alt = make_unused_name(path);
                warn!(
                    "saving {} failed ({err:#}), trying {}",
                    path.display(),
                    alt.display()
                );
                self.save(&alt)
                    .with_context(|| format!("fallback save to {}", alt.display()))?;
                Ok(alt)
            }
        }
    }

    /// Best-effort flush after a completed unit of work. A failed checkpoint
    /// only logs; the data is still in memory and the end-of-run save gets
    /// the fallback path.
    pub fn checkpoint(&self, path: &Path) {
        if let Err(err) = self.save(path) {
            warn!("checkpoint to {} failed: {err:#}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Cell;
    use tempfile::tempdir;

    fn rec(fields: &[(&str, Cell)]) -> Vec<(String, Cell)> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let wb = Workbook::load(&dir.path().join("zakupki.json")).unwrap();
        assert!(wb.sheet("jobs").is_none());
    }

    #[test]
    fn sheets_take_their_fixed_positions() {
        let mut wb = Workbook::default();
        wb.lots();
        wb.log();
        wb.jobs();
        let names: Vec<&str> = wb.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["log", "jobs", "lots"]);
    }

    #[test]
    fn save_and_reload_preserves_rows_columns_and_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");

        let mut wb = Workbook::default();
        wb.jobs()
            .append(rec(&[("INN", "7701".into()), ("year", 2024.into())]));
        wb.jobs().append(rec(&[("INN", "7702".into())]));
        wb.lots()
            .append(rec(&[("name", "поставка перчаток".into()), ("price", 1234.56.into())]));
        wb.save(&path).unwrap();

        let mut back = Workbook::load(&path).unwrap();
        let jobs = back.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs.get(0).unwrap().get("ID"), Some(&Cell::Int(1)));
        assert_eq!(jobs.get(1).unwrap().get("ID"), Some(&Cell::Int(2)));
        assert!(jobs.columns().contains(&"year".to_string()));
        // the ID sequence continues where it left off
        assert_eq!(jobs.append(rec(&[("INN", "7703".into())])), 3);
        assert_eq!(
            back.lots().get(0).unwrap().get("price"),
            Some(&Cell::Float(1234.56))
        );
    }

    #[test]
    fn fallback_save_picks_a_fresh_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        // a directory squatting on the target path makes the rename fail
        std::fs::create_dir(&path).unwrap();

        let mut wb = Workbook::default();
        wb.jobs().append(rec(&[("INN", "7701".into())]));
        let used = wb.save_with_fallback(&path).unwrap();
        assert_eq!(used, dir.path().join("zakupki (1).json"));
        assert!(used.exists());
    }
}
