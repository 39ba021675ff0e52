//! Stage 2: enrich each collected lot from its supplier-results and
//! item-catalog detail pages.

pub mod goods;
pub mod suppliers;

use crate::fetch::urls::{reg_number_query, COMMON_INFO_URL, SUPPLIER_RESULTS_URL};
use crate::fetch::{Fetch, ScrapeError};
use crate::store::{Cell, Row, Workbook};
use anyhow::Result;
use scraper::Html;
use std::path::Path;
use tracing::{error, info, warn};

/// Status text of a cancelled supplier determination; there is nothing to
/// enrich behind it.
pub const CANCELLED_STAGE: &str = "Определение поставщика отменено";

/// Per-lot enrichment progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage2 {
    None,
    Done,
    Error,
}

impl Stage2 {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage2::None => "none",
            Stage2::Done => "done",
            Stage2::Error => "error",
        }
    }
}

/// Registration numbers in workbooks written by the old Excel tool are
/// wrapped in literal quotes; strip them on the way out.
pub fn reg_number(row: &Row) -> Option<String> {
    row.get("number")
        .map(|c| c.to_string().trim_matches('"').to_string())
        .filter(|n| !n.is_empty())
}

/// Run stage 2 over every lot whose `stage2` is not `done`. Failures are
/// contained to the lot: its `stage2` flips to `error`, the cause is logged
/// and the loop moves on. The workbook is checkpointed after each lot.
pub fn run(wb: &mut Workbook, fetch: &dyn Fetch, store_path: &Path) -> Result<()> {
    let lots_count = wb.lots().len();
    if lots_count == 0 {
        info!("no lots collected yet, run stage 1 first");
        return Ok(());
    }

    for index in 0..lots_count {
        let row = wb.lots().get(index)?;
        if row.get("stage2").and_then(Cell::as_str) == Some(Stage2::Done.as_str()) {
            continue;
        }

        let name = row.get("name").and_then(Cell::as_str).unwrap_or("");
        let price = row.get("price").and_then(Cell::as_f64).unwrap_or(0.0);
        info!("lot {}/{lots_count}: {price} руб, `{name}`", index + 1);

        let stage_text = row.get("stage").and_then(Cell::as_str).unwrap_or("");
        if stage_text == CANCELLED_STAGE {
            info!("{CANCELLED_STAGE}, nothing to enrich");
            wb.lots().set(
                index,
                [("stage2".to_string(), Cell::from(Stage2::Done.as_str()))],
            )?;
            wb.checkpoint(store_path);
            continue;
        }

        let outcome = match reg_number(&row) {
            Some(number) => enrich_lot(fetch, &number),
            None => Err(ScrapeError::structure("lot row without registration number")),
        };
        let update = match outcome {
            Ok(mut fields) => {
                fields.push(("stage2".to_string(), Cell::from(Stage2::Done.as_str())));
                fields
            }
            Err(err) => {
                if err.is_structural() {
                    error!(
                        "lot {}: {err}; the portal layout may have changed",
                        index + 1
                    );
                } else {
                    warn!("lot {}: {err}; re-run stage 2 to retry", index + 1);
                }
                vec![("stage2".to_string(), Cell::from(Stage2::Error.as_str()))]
            }
        };
        wb.lots().set(index, update)?;
        wb.checkpoint(store_path);
    }
    Ok(())
}

/// Fetch and extract both detail pages for one registration number.
fn enrich_lot(fetch: &dyn Fetch, number: &str) -> Result<Vec<(String, Cell)>, ScrapeError> {
    let mut fields = Vec::new();

    let body = fetch.get_text(SUPPLIER_RESULTS_URL, &reg_number_query(number))?;
    suppliers::extract(&Html::parse_document(&body), &mut fields)?;

    let body = fetch.get_text(COMMON_INFO_URL, &reg_number_query(number))?;
    goods::extract(&Html::parse_document(&body), &mut fields)?;

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;
    use tempfile::tempdir;

    struct SeqFetch {
        supplier_page: String,
        goods_page: String,
        calls: StdCell<usize>,
    }

    impl Fetch for SeqFetch {
        fn get_text(&self, url: &str, _query: &[(&str, String)]) -> Result<String, ScrapeError> {
            self.calls.set(self.calls.get() + 1);
            if url == SUPPLIER_RESULTS_URL {
                Ok(self.supplier_page.clone())
            } else if url == COMMON_INFO_URL {
                Ok(self.goods_page.clone())
            } else {
                Err(ScrapeError::structure(format!("unexpected url {url}")))
            }
        }

        fn get_bytes(&self, _url: &str) -> Result<Vec<u8>, ScrapeError> {
            Err(ScrapeError::structure("no bytes in stage 2"))
        }
    }

    struct FailingFetch {
        calls: StdCell<usize>,
    }

    impl Fetch for FailingFetch {
        fn get_text(&self, url: &str, _query: &[(&str, String)]) -> Result<String, ScrapeError> {
            self.calls.set(self.calls.get() + 1);
            Err(ScrapeError::Status {
                url: url.to_string(),
                status: reqwest::StatusCode::BAD_GATEWAY,
            })
        }

        fn get_bytes(&self, _url: &str) -> Result<Vec<u8>, ScrapeError> {
            Err(ScrapeError::structure("no bytes in stage 2"))
        }
    }

    fn lot(stage: &str, stage2: &str) -> Vec<(String, Cell)> {
        vec![
            ("number".to_string(), Cell::from("0373100064623000112")),
            ("stage".to_string(), Cell::from(stage)),
            ("name".to_string(), Cell::from("Поставка перчаток")),
            ("price".to_string(), Cell::from(1234.56)),
            ("stage2".to_string(), Cell::from(stage2)),
            ("stage3".to_string(), Cell::from("no")),
        ]
    }

    #[test]
    fn cancelled_lots_finish_without_any_network_call() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        let mut wb = Workbook::default();
        wb.lots().append(lot(CANCELLED_STAGE, "none"));
        let fetch = FailingFetch {
            calls: StdCell::new(0),
        };

        run(&mut wb, &fetch, &path).unwrap();

        assert_eq!(fetch.calls.get(), 0);
        let row = wb.lots().get(0).unwrap();
        assert_eq!(row.get("stage2").and_then(Cell::as_str), Some("done"));
    }

    #[test]
    fn done_lots_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        let mut wb = Workbook::default();
        wb.lots().append(lot("Подача заявок", "done"));
        let fetch = FailingFetch {
            calls: StdCell::new(0),
        };

        run(&mut wb, &fetch, &path).unwrap();
        assert_eq!(fetch.calls.get(), 0);
    }

    #[test]
    fn detail_fields_are_merged_into_the_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        let mut wb = Workbook::default();
        wb.lots().append(lot("Подача заявок", "none"));
        let fetch = SeqFetch {
            supplier_page: suppliers::tests::supplier_page(),
            goods_page: goods::tests::goods_page(),
            calls: StdCell::new(0),
        };

        run(&mut wb, &fetch, &path).unwrap();

        assert_eq!(fetch.calls.get(), 2);
        let row = wb.lots().get(0).unwrap();
        assert_eq!(row.get("stage2").and_then(Cell::as_str), Some("done"));
        assert_eq!(
            row.get("customer").and_then(Cell::as_str),
            Some("ГБУЗ Городская больница")
        );
        assert_eq!(
            row.get("supplier1_name").and_then(Cell::as_str),
            Some("ООО Ромашка")
        );
        assert_eq!(
            row.get("good_01_KTRU").and_then(Cell::as_str),
            Some("21.20.10.110-00001")
        );
    }

    #[test]
    fn network_failure_flips_stage2_to_error_and_continues() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zakupki.json");
        let mut wb = Workbook::default();
        wb.lots().append(lot("Подача заявок", "none"));
        wb.lots().append(lot("Подача заявок", "none"));
        let fetch = FailingFetch {
            calls: StdCell::new(0),
        };

        run(&mut wb, &fetch, &path).unwrap();

        for index in 0..2 {
            let row = wb.lots().get(index).unwrap();
            assert_eq!(row.get("stage2").and_then(Cell::as_str), Some("error"));
        }
    }
}
