//! Stage 3: download the attachments of lots the operator flagged in the
//! workbook.

use crate::enrich::reg_number;
use crate::fetch::urls::{reg_number_query, DOCUMENTS_URL};
use crate::fetch::{Fetch, ScrapeError};
use crate::fsutil::make_unused_name;
use crate::html::select_one;
use crate::store::{Cell, Workbook};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};
use url::Url;

static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.cardWrapper.outerWrapper").expect("valid card selector"));
static WRAPPER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.wrapper").expect("valid wrapper selector"));
static ATTACHMENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.attachment").expect("valid attachment selector"));
static VALUE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.section__value a").expect("valid attachment link selector"));

/// Document-download progress. The operator requests a download by editing
/// a lot's `stage3` cell to anything other than `no`/`done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage3 {
    No,
    Requested,
    Done,
}

impl Stage3 {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage3::No => "no",
            Stage3::Requested => "requested",
            Stage3::Done => "done",
        }
    }

    /// Permissive on purpose: any sentinel the operator wrote counts as a
    /// request; a missing cell does not.
    pub fn from_cell(cell: Option<&Cell>) -> Stage3 {
        match cell {
            None => Stage3::No,
            Some(cell) => match cell.to_string().as_str() {
                "no" => Stage3::No,
                "done" => Stage3::Done,
                _ => Stage3::Requested,
            },
        }
    }
}

/// Deterministic per-lot directory name: the row id plus the price in
/// millions of roubles.
pub fn lot_dir_name(id: i64, price: f64) -> String {
    format!("Лот {id:03} {:.3} М руб", price * 1e-6)
}

/// Run stage 3 over every flagged lot, downloading into `out_dir` (the
/// working directory in production). A failed lot keeps its `requested`
/// state so the next run retries it; `done` is only written after every
/// attachment landed on disk.
pub fn run(wb: &mut Workbook, fetch: &dyn Fetch, store_path: &Path, out_dir: &Path) -> Result<()> {
    let lots_count = wb.lots().len();
    if lots_count == 0 {
        info!("no lots collected yet, run stage 1 first");
        return Ok(());
    }

    for index in 0..lots_count {
        let row = wb.lots().get(index)?;
        match Stage3::from_cell(row.get("stage3")) {
            Stage3::No | Stage3::Done => continue,
            Stage3::Requested => {}
        }

        let id = row.get("ID").and_then(Cell::as_i64).unwrap_or(0);
        let price = row.get("price").and_then(Cell::as_f64).unwrap_or(0.0);
        let dir = out_dir.join(lot_dir_name(id, price));
        if !dir.is_dir() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating lot directory {}", dir.display()))?;
        }
        info!("{}", dir.display());

        let Some(number) = reg_number(&row) else {
            warn!("lot {id} has no registration number, skipping");
            continue;
        };

        match download_documents(fetch, &number, &dir) {
            Ok(count) => {
                info!("lot {id}: {count} files saved");
                wb.lots().set(
                    index,
                    [("stage3".to_string(), Cell::from(Stage3::Done.as_str()))],
                )?;
                wb.checkpoint(store_path);
            }
            Err(err) => {
                // state stays `requested` so the next run picks the lot up
                if err.is_structural() {
                    error!("lot {id}: {err}; the portal layout may have changed");
                } else {
                    warn!("lot {id}: {err}; re-run stage 3 to retry");
                }
            }
        }
    }
    Ok(())
}

/// Fetch the documents page and download every attachment, collision-safe.
/// Returns how many files were written.
fn download_documents(fetch: &dyn Fetch, number: &str, dir: &Path) -> Result<usize, ScrapeError> {
    let base = Url::parse(DOCUMENTS_URL)
        .map_err(|_| ScrapeError::structure("documents endpoint is not a valid url"))?;
    let body = fetch.get_text(DOCUMENTS_URL, &reg_number_query(number))?;
    let doc = Html::parse_document(&body);
    let card = doc
        .select(&CARD)
        .next()
        .ok_or_else(|| ScrapeError::structure("documents card missing"))?;
    let wrapper = select_one(card, &WRAPPER, "documents card body")?;

    let mut saved = 0;
    for attachment in wrapper.select(&ATTACHMENT) {
        let link = select_one(attachment, &VALUE_LINK, "attachment link")?;
        let src = link
            .value()
            .attr("href")
            .ok_or_else(|| ScrapeError::structure("attachment link without href"))?;
        let title = link
            .value()
            .attr("title")
            .ok_or_else(|| ScrapeError::structure("attachment link without title"))?;
        // titles occasionally carry path separators
        let file_name = title.trim().replace('/', "_");
        if file_name.is_empty() {
            return Err(ScrapeError::structure("attachment with an empty title"));
        }
        let url = base
            .join(src)
            .map_err(|_| ScrapeError::structure(format!("bad attachment href `{src}`")))?;

        info!("downloading {url}");
        let bytes = fetch.get_bytes(url.as_str())?;
        let dest = make_unused_name(dir.join(&file_name));
        fs::write(&dest, bytes).map_err(|source| ScrapeError::Io {
            path: dest.display().to_string(),
            source,
        })?;
        info!("saved {file_name} to {}", dest.display());
        saved += 1;
    }
    Ok(saved)
}
