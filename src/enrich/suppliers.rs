//! Supplier-results page: the customer table and the bidder table, found by
//! caption prefix inside the card's info block.

use crate::fetch::ScrapeError;
use crate::html::{next_element_named, select_one, text_of};
use crate::store::Cell;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.cardWrapper.outerWrapper").expect("valid card selector"));
static WRAPPER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.wrapper").expect("valid wrapper selector"));
static CARD_HEADER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.cardHeaderBlock").expect("valid card header selector"));
static BLOCK_INFO: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.row.blockInfo").expect("valid info block selector"));
static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid table selector"));
static CAPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead tr th").expect("valid caption selector"));
static BODY_ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr").expect("valid body row selector"));
static BODY_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody td").expect("valid body cell selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid cell selector"));

const CUSTOMER_CAPTION: &str = "Заказчик";
const BIDDER_CAPTION: &str = "Участник";

/// Walk the info tables. The table whose first header cell starts with
/// `Заказчик` carries the customer name in its single body cell; the one
/// starting with `Участник` lists bidders, three cells per row, flattened
/// into `supplierN_name` / `supplierN_status` / `supplierN_price`.
pub fn extract(doc: &Html, fields: &mut Vec<(String, Cell)>) -> Result<(), ScrapeError> {
    let card = doc
        .select(&CARD)
        .next()
        .ok_or_else(|| ScrapeError::structure("supplier-results card missing"))?;
    let wrapper = select_one(card, &WRAPPER, "supplier-results card body")?;
    let header = select_one(wrapper, &CARD_HEADER, "supplier-results card header")?;
    let after_header = next_element_named(header, "div")
        .ok_or_else(|| ScrapeError::structure("supplier-results card has no body block"))?;
    let info = select_one(after_header, &BLOCK_INFO, "supplier-results info block")?;

    for table in info.select(&TABLE) {
        let caption = text_of(select_one(table, &CAPTION, "supplier table caption")?);
        if caption.starts_with(CUSTOMER_CAPTION) {
            let cell = select_one(table, &BODY_CELL, "customer cell")?;
            fields.push(("customer".to_string(), Cell::from(text_of(cell))));
        } else if caption.starts_with(BIDDER_CAPTION) {
            for (i, tr) in table.select(&BODY_ROW).enumerate() {
                let n = i + 1;
                let cells: Vec<String> = tr.select(&CELL).take(3).map(text_of).collect();
                let [name, status, price] = <[String; 3]>::try_from(cells).map_err(|cells| {
                    ScrapeError::structure(format!(
                        "bidder row {n} has {} cells, expected 3",
                        cells.len()
                    ))
                })?;
                fields.push((format!("supplier{n}_name"), name.into()));
                fields.push((format!("supplier{n}_status"), status.into()));
                fields.push((format!("supplier{n}_price"), price.into()));
            }
        }
    }
    Ok(())
}
