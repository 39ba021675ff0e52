//! Stage 1: expand INN × year selections into monthly search jobs, then
//! drain every job that has not finished yet.

pub mod blacklist;
pub mod listing;

use crate::context::RunContext;
use crate::fetch::Fetch;
use crate::store::{Cell, Sheet, Workbook};
use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, warn};

/// Search-job lifecycle. Anything that is not `done` gets picked up again
/// on the next run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Done,
    Error,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Done => "done",
            JobState::Error => "error",
        }
    }
}

/// Normalize the requested years: two-digit values mean 20xx, anything
/// outside [2000, current year] is dropped, and an empty result falls back
/// to the current year alone.
pub fn normalize_years(requested: &[i32], current_year: i32) -> Vec<i32> {
    let mut years: Vec<i32> = requested
        .iter()
        .copied()
        .filter(|&y| y >= 0)
        .map(|y| if y < 100 { y + 2000 } else { y })
        .filter(|&y| (2000..=current_year).contains(&y))
        .collect();
    if years.is_empty() {
        return vec![current_year];
    }
    years.sort_unstable();
    years.dedup();
    years
}

/// Append one pending job per INN × year × month, skipping months the
/// calendar has not reached yet and combinations a previous run already
/// scheduled.
pub fn schedule_jobs(jobs: &mut Sheet, inns: &[String], years: &[i32], ctx: &RunContext) {
    let mut existing: HashSet<(String, i64, i64)> = HashSet::new();
    for index in 0..jobs.len() {
        let Ok(row) = jobs.get(index) else { continue };
        let inn = row.get("INN").map(|c| c.to_string());
        let year = row.get("year").and_then(Cell::as_i64);
        let month = row.get("month").and_then(Cell::as_i64);
        if let (Some(inn), Some(year), Some(month)) = (inn, year, month) {
            existing.insert((inn, year, month));
        }
    }

    let mut added = 0usize;
    let mut skipped = 0usize;
    for inn in inns {
        for &year in years {
            let last_month = if year == ctx.current_year() {
                ctx.current_month()
            } else {
                12
            };
            for month in 1..=last_month {
                let key = (inn.clone(), year as i64, month as i64);
                if !existing.insert(key) {
                    skipped += 1;
                    continue;
                }
                jobs.append([
                    ("INN".to_string(), Cell::from(inn.as_str())),
                    ("year".to_string(), Cell::from(year)),
                    ("month".to_string(), Cell::from(month)),
                    ("state".to_string(), Cell::from(JobState::Pending.as_str())),
                ]);
                added += 1;
            }
        }
    }
    if added > 0 || skipped > 0 {
        info!("scheduled {added} search jobs ({skipped} already present)");
    }
}

/// Run stage 1. Every job failure is contained to that job: its state flips
/// to `error`, the cause is logged and the loop moves on. The workbook is
/// checkpointed after each job reaches a terminal state.
pub fn run(
    wb: &mut Workbook,
    fetch: &dyn Fetch,
    store_path: &Path,
    inns: &[String],
    years: &[i32],
    ctx: &RunContext,
) -> Result<()> {
    schedule_jobs(wb.jobs(), inns, years, ctx);

    let jobs_count = wb.jobs().len();
    for index in 0..jobs_count {
        let row = wb.jobs().get(index)?;
        let state = row.get("state").and_then(Cell::as_str).unwrap_or("pending");
        if state == JobState::Done.as_str() {
            continue;
        }
        let (Some(inn), Some(year), Some(month)) = (
            row.get("INN").map(|c| c.to_string()),
            row.get("year").and_then(Cell::as_i64),
            row.get("month").and_then(Cell::as_i64),
        ) else {
            warn!("job {index} is missing INN/year/month, skipping");
            continue;
        };

        let outcome = listing::collect_month(wb.lots(), fetch, &inn, year as i32, month as u32);
        let new_state = match outcome {
            Ok(count) => {
                info!("INN {inn} {year}-{month:02}: {count} lots collected");
                JobState::Done
            }
            Err(err) => {
                if err.is_structural() {
                    error!("INN {inn} {year}-{month:02}: {err}; the portal layout may have changed");
                } else {
                    warn!("INN {inn} {year}-{month:02}: {err}; re-run stage 1 to retry");
                }
                JobState::Error
            }
        };
        wb.jobs()
            .set(index, [("state".to_string(), Cell::from(new_state.as_str()))])?;
        wb.checkpoint(store_path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ScrapeError;
    use chrono::{Local, TimeZone};
    use std::cell::Cell as StdCell;
    use tempfile::tempdir;

    fn ctx_at(year: i32, month: u32) -> RunContext {
        let started = Local
            .with_ymd_and_hms(year, month, 15, 12, 0, 0)
            .single()
            .unwrap();
        RunContext::new(started, vec!["zakscraper".to_string()])
    }

    struct CountingFetch {
        calls: StdCell<usize>,
    }

    impl Fetch for CountingFetch {
        fn get_text(&self, _url: &str, _query: &[(&str, String)]) -> Result<String, ScrapeError> {
            self.calls.set(self.calls.get() + 1);
            Err(ScrapeError::structure("no portal in tests"))
        }

        fn get_bytes(&self, _url: &str) -> Result<Vec<u8>, ScrapeError> {
            Err(ScrapeError::structure("no portal in tests"))
        }
    }

    #[test]
    fn years_are_normalized_and_clamped() {
        assert_eq!(normalize_years(&[21, 2022, 21], 2026), vec![2021, 2022]);
        assert_eq!(normalize_years(&[3000, -5, 1999], 2026), vec![2026]);
        assert_eq!(normalize_years(&[], 2026), vec![2026]);
    }

    #[test]
    fn current_year_is_capped_at_current_month() {
        let mut jobs = Sheet::new();
        schedule_jobs(
            &mut jobs,
            &["7701".to_string()],
            &[2024, 2023],
            &ctx_at(2024, 3),
        );
        // 3 months of 2024 plus all 12 of 2023
        assert_eq!(jobs.len(), 15);
        let first = jobs.get(0).unwrap();
        assert_eq!(first.get("state").and_then(Cell::as_str), Some("pending"));
        assert_eq!(first.get("year").and_then(Cell::as_i64), Some(2024));
    }

    #[test]
    fn rescheduling_the_same_selection_adds_nothing() {
        let mut jobs = Sheet::new();
        let inns = vec!["7701".to_string()];
        let ctx = ctx_at(2024, 3);
        schedule_jobs(&mut jobs, &inns, &[2023], &ctx);
        assert_eq!(jobs.len(), 12);
        schedule_jobs(&mut jobs, &inns, &[2023], &ctx);
        assert_eq!(jobs.len(), 12);
    }

    #[test]
    fn no_inns_schedule_nothing() {
        let mut jobs = Sheet::new();
        schedule_jobs(&mut jobs, &[], &[2024], &ctx_at(2024, 3));
        assert!(jobs.is_empty());
    }

    #[test]
    fn done_jobs_are_not_refetched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        let mut wb = Workbook::default();
        wb.jobs().append([
            ("INN".to_string(), Cell::from("7701")),
            ("year".to_string(), Cell::from(2024)),
            ("month".to_string(), Cell::from(1u32)),
            ("state".to_string(), Cell::from("done")),
        ]);
        let fetch = CountingFetch {
            calls: StdCell::new(0),
        };

        run(&mut wb, &fetch, &path, &[], &[], &ctx_at(2024, 3)).unwrap();

        assert_eq!(fetch.calls.get(), 0);
        let row = wb.jobs().get(0).unwrap();
        assert_eq!(row.get("state").and_then(Cell::as_str), Some("done"));
    }

    #[test]
    fn failed_jobs_flip_to_error_and_the_run_survives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        let mut wb = Workbook::default();
        let fetch = CountingFetch {
            calls: StdCell::new(0),
        };

        run(
            &mut wb,
            &fetch,
            &path,
            &["7701".to_string()],
            &[2024],
            &ctx_at(2024, 2),
        )
        .unwrap();

        assert_eq!(wb.jobs().len(), 2);
        for index in 0..2 {
            let row = wb.jobs().get(index).unwrap();
            assert_eq!(row.get("state").and_then(Cell::as_str), Some("error"));
        }
        // the checkpoint after each job leaves the file behind
        assert!(path.exists());
    }
}
