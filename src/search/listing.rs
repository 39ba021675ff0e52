//! Paginated extended search and per-entry extraction.

use crate::docs::Stage3;
use crate::enrich::Stage2;
use crate::fetch::urls::{search_query, BASE_URL, EXTENDED_SEARCH_URL};
use crate::fetch::{Fetch, ScrapeError};
use crate::html::{collapse_spaces, next_element_with_class, select_one, text_of};
use crate::search::blacklist;
use crate::store::{Cell, Sheet};
use chrono::{Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

static ENTRY: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.search-registry-entry-block.box-shadow-search-input")
        .expect("valid entry selector")
});
static TOTAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.search-results__total").expect("valid total selector"));
static HEADER_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.registry-entry__header-top__title").expect("valid header selector")
});
static NUMBER: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.registry-entry__header-mid__number").expect("valid number selector")
});
static MID_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.registry-entry__header-mid__title").expect("valid stage selector")
});
static BODY_VALUE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.registry-entry__body-value").expect("valid name selector")
});
static BODY_HREF: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.registry-entry__body-href").expect("valid agency selector")
});
static PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.price-block__value").expect("valid price selector"));
static DATA_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.data-block.mt-auto div.data-block__title")
        .expect("valid date-label selector")
});
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid anchor selector"));

const FZ44: &str = "44-ФЗ";

/// One accepted search-result entry, before it becomes a lots-sheet row.
#[derive(Debug)]
pub struct LotEntry {
    pub fz: String,
    pub subtype: String,
    pub link: String,
    pub number: String,
    pub stage: String,
    pub name: String,
    pub agency: String,
    pub agency_link: String,
    pub price: f64,
    pub published: Option<NaiveDate>,
    pub updated: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl LotEntry {
    /// The initial lots-sheet row: core fields plus the progress flags the
    /// later stages drive. Absent dates stay absent.
    pub fn into_record(self) -> Vec<(String, Cell)> {
        let mut rec: Vec<(String, Cell)> = vec![
            ("fz".into(), self.fz.into()),
            ("subtype".into(), self.subtype.into()),
            ("link".into(), self.link.into()),
            ("number".into(), self.number.into()),
            ("stage".into(), self.stage.into()),
            ("name".into(), self.name.into()),
            ("agency".into(), self.agency.into()),
            ("agency_link".into(), self.agency_link.into()),
            ("price".into(), self.price.into()),
        ];
        if let Some(d) = self.published {
            rec.push(("published".into(), d.into()));
        }
        if let Some(d) = self.updated {
            rec.push(("updated".into(), d.into()));
        }
        if let Some(d) = self.last_date {
            rec.push(("last_date".into(), d.into()));
        }
        rec.push(("stage2".into(), Stage2::None.as_str().into()));
        rec.push(("stage3".into(), Stage3::No.as_str().into()));
        rec
    }
}

/// First and last day of the month.
pub fn month_window(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first
        .checked_add_months(Months::new(1))?
        .checked_sub_days(Days::new(1))?;
    Some((first, last))
}

/// Run the paginated search for one (INN, month) job, appending accepted
/// lots to the sheet. Pages are fetched sequentially from 1 and pagination
/// stops the first time a page yields zero accepted entries. Returns how
/// many lots were appended.
pub fn collect_month(
    lots: &mut Sheet,
    fetch: &dyn Fetch,
    inn: &str,
    year: i32,
    month: u32,
) -> Result<usize, ScrapeError> {
    let (from, to) = month_window(year, month)
        .ok_or_else(|| ScrapeError::structure(format!("bad search window {year}-{month}")))?;
    info!(
        "searching INN {inn} from {} to {}",
        from.format("%d.%m.%Y"),
        to.format("%d.%m.%Y")
    );

    let mut appended = 0;
    let mut page = 1u32;
    loop {
        let body = fetch.get_text(EXTENDED_SEARCH_URL, &search_query(inn, from, to, page))?;
        let doc = Html::parse_document(&body);

        if page == 1 {
            let total = total_marker(&doc)?;
            info!("portal reports `{total}` entries for the period");
            // "более 1000" means the count overflowed and the result set is
            // unbounded; committing pages from it would be garbage
            if total.starts_with("бол") {
                return Err(ScrapeError::TooManyResults);
            }
        }

        let accepted = extract_page(lots, &doc)?;
        if accepted == 0 {
            break;
        }
        appended += accepted;
        page += 1;
    }
    Ok(appended)
}

fn total_marker(doc: &Html) -> Result<String, ScrapeError> {
    doc.select(&TOTAL)
        .next()
        .map(text_of)
        .ok_or_else(|| ScrapeError::structure("total-results marker missing from page 1"))
}

/// Extract every entry block on one page. Returns how many were accepted;
/// blacklisted names are dropped silently and do not count toward the
/// page-continuation decision.
fn extract_page(lots: &mut Sheet, doc: &Html) -> Result<usize, ScrapeError> {
    let mut accepted = 0;
    for block in doc.select(&ENTRY) {
        let Some(entry) = extract_entry(block)? else {
            continue;
        };
        accepted += 1;
        info!("{accepted:3}: {}", entry.name);
        lots.append(entry.into_record());
    }
    Ok(accepted)
}

/// Parse one `search-registry-entry-block`. Returns `None` for blacklisted
/// names; any missing or unrecognized piece of markup is a structural error
/// that fails the whole page (and with it the job).
fn extract_entry(block: ElementRef) -> Result<Option<LotEntry>, ScrapeError> {
    let header = select_one(block, &HEADER_TITLE, "entry header")?;
    let lines: Vec<String> = header
        .text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    let [fz, subtype] = <[String; 2]>::try_from(lines).map_err(|lines| {
        ScrapeError::structure(format!("entry header has {} lines, expected 2", lines.len()))
    })?;

    let number_block = select_one(block, &NUMBER, "registry number block")?;
    let number_link = select_one(number_block, &ANCHOR, "registry number link")?;
    let href = number_link
        .value()
        .attr("href")
        .ok_or_else(|| ScrapeError::structure("registry number link without href"))?;
    // 44-ФЗ entries carry portal-relative links, 223-ФЗ ones are absolute
    let link = if fz == FZ44 {
        format!("{BASE_URL}{href}")
    } else {
        href.to_string()
    };
    let number_text = text_of(number_link);
    let number = match number_text.split_whitespace().collect::<Vec<_>>()[..] {
        ["№", number] => number.to_string(),
        _ => {
            return Err(ScrapeError::structure(format!(
                "registry number `{number_text}` not in `№ <number>` form"
            )))
        }
    };

    let stage = text_of(select_one(block, &MID_TITLE, "procurement stage")?);

    let raw_name = text_of(select_one(block, &BODY_VALUE, "lot name")?);
    let name = collapse_spaces(&raw_name.replace(['\n', '\r'], " "));
    if blacklist::is_blacklisted(&name.to_lowercase()) {
        debug!("blacklisted: {name}");
        return Ok(None);
    }

    let agency_block = select_one(block, &BODY_HREF, "agency block")?;
    let agency_link_el = select_one(agency_block, &ANCHOR, "agency link")?;
    let agency_href = agency_link_el
        .value()
        .attr("href")
        .ok_or_else(|| ScrapeError::structure("agency link without href"))?;
    let agency_link = format!("{BASE_URL}{agency_href}");
    let agency = text_of(agency_link_el);

    let price = parse_price(&text_of(select_one(block, &PRICE, "price block")?))?;

    let mut published = None;
    let mut updated = None;
    let mut last_date = None;
    for title in block.select(&DATA_TITLE) {
        let label = text_of(title);
        let value_el = next_element_with_class(title, "data-block__value")
            .ok_or_else(|| ScrapeError::structure(format!("date label `{label}` without value")))?;
        let text = text_of(value_el);
        let date = NaiveDate::parse_from_str(text.trim(), "%d.%m.%Y").map_err(|_| {
            ScrapeError::structure(format!("unparseable date `{text}` under `{label}`"))
        })?;
        match label.as_str() {
            "Размещено" => published = Some(date),
            "Обновлено" => updated = Some(date),
            "Окончание подачи заявок" => last_date = Some(date),
            other => {
                return Err(ScrapeError::structure(format!(
                    "unknown date label `{other}`"
                )))
            }
        }
    }

    Ok(Some(LotEntry {
        fz,
        subtype,
        link,
        number,
        stage,
        name,
        agency,
        agency_link,
        price,
        published,
        updated,
        last_date,
    }))
}

/// `"1 234,56 ₽"` → 1234.56: currency glyph and non-breaking spaces out,
/// decimal comma to a point.
pub fn parse_price(raw: &str) -> Result<f64, ScrapeError> {
    let cleaned = raw.replace('₽', "").replace('\u{a0}', "").replace(',', ".");
    cleaned
        .trim()
        .parse::<f64>()
        .map_err(|_| ScrapeError::structure(format!("unparseable price `{}`", raw.trim())))
}
