//! Item-catalog page: the header row drives column binding by prefix, each
//! data row becomes a `good_NN_<column>` field cluster.

use crate::fetch::ScrapeError;
use crate::html::{select_one, text_of};
use crate::store::Cell;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashMap;
use tracing::warn;

static KTRU_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div#positionKTRU").expect("valid catalog selector"));
static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid table selector"));
static HEAD_CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead th, thead td").expect("valid header selector"));
static ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr.tableBlock__row").expect("valid row selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid cell selector"));

/// Header-prefix → output column key. Unrecognized headers are ignored.
fn column_key(header: &str) -> Option<&'static str> {
    if header.starts_with("Код") {
        Some("KTRU")
    } else if header.starts_with("Наименование") {
        Some("name")
    } else if header.starts_with("Количество") {
        Some("count")
    } else if header.starts_with("Цена") {
        Some("price")
    } else if header.starts_with("Стоимость") {
        Some("value")
    } else {
        None
    }
}

/// Portal cell text is noisy: control characters, non-breaking spaces,
/// typographic comparison operators. Flatten it to plain ASCII-ish text.
pub fn normalize_item_text(raw: &str) -> String {
    let mut value = raw.trim().replace(['\r', '\n'], "");
    value = value.replace('\u{a0}', "");
    value = value.replace('\u{2264}', "<=");
    value = value.replace('\u{2265}', ">=");
    value = value.replace('\u{2070}', "0");
    while value.contains("  ") {
        value = value.replace("  ", " ");
    }
    value
}

pub fn extract(doc: &Html, fields: &mut Vec<(String, Cell)>) -> Result<(), ScrapeError> {
    let block = doc
        .select(&KTRU_BLOCK)
        .next()
        .ok_or_else(|| ScrapeError::structure("item-catalog block missing"))?;
    let table = select_one(block, &TABLE, "item-catalog table")?;

    let mut bound: HashMap<usize, &'static str> = HashMap::new();
    for (i, cell) in table.select(&HEAD_CELLS).enumerate() {
        if let Some(key) = column_key(&text_of(cell)) {
            bound.insert(i, key);
        }
    }
    if bound.is_empty() {
        warn!("item-catalog header matched no known columns");
    }

    for (row_index, tr) in table.select(&ROW).enumerate() {
        let item = row_index + 1;
        for (i, td) in tr.select(&CELL).enumerate() {
            if let Some(key) = bound.get(&i) {
                fields.push((
                    format!("good_{item:02}_{key}"),
                    Cell::from(normalize_item_text(&text_of(td))),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn goods_page() -> String {
        "<html><body><div id=\"positionKTRU\">\
         <table>\
         <thead><tr>\
         <th>№</th>\
         <th>Код позиции</th>\
         <th>Наименование товара, работы, услуги</th>\
         <th>Количество</th>\
         <th>Цена за единицу</th>\
         <th>Стоимость</th>\
         </tr></thead>\
         <tbody>\
         <tr class=\"tableBlock__row\">\
         <td>1</td>\
         <td>21.20.10.110-00001</td>\
         <td>Перчатки  нитриловые, прочность \u{2265} 9\u{a0}Н</td>\
         <td>300</td>\
         <td>12,50</td>\
         <td>3\u{a0}750,00</td>\
         </tr>\
         <tr class=\"tableBlock__row\">\
         <td>2</td>\
         <td>21.20.10.110-00002</td>\
         <td>Бинт марлевый</td>\
         <td>100</td>\
         <td>20,00</td>\
         <td>2\u{a0}000,00</td>\
         </tr>\
         </tbody>\
         </table>\
         </div></body></html>"
            .to_string()
    }

    #[test]
    fn rows_become_numbered_field_clusters() {
        let doc = Html::parse_document(&goods_page());
        let mut fields = Vec::new();
        extract(&doc, &mut fields).unwrap();

        let get = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.as_str())
                .map(str::to_string)
        };
        assert_eq!(get("good_01_KTRU").as_deref(), Some("21.20.10.110-00001"));
        assert_eq!(
            get("good_01_name").as_deref(),
            Some("Перчатки нитриловые, прочность >= 9Н")
        );
        assert_eq!(get("good_01_count").as_deref(), Some("300"));
        assert_eq!(get("good_01_price").as_deref(), Some("12,50"));
        assert_eq!(get("good_01_value").as_deref(), Some("3750,00"));
        assert_eq!(get("good_02_name").as_deref(), Some("Бинт марлевый"));
        // the unbound first column never produces a field
        assert!(fields.iter().all(|(k, _)| !k.ends_with("_№")));
    }

    #[test]
    fn catalog_text_is_normalized() {
        assert_eq!(
            normalize_item_text("прочность \u{2264}\u{a0}9  Н\r\n"),
            "прочность <=9 Н"
        );
        assert_eq!(normalize_item_text("  a   b  "), "a b");
    }

    #[test]
    fn missing_catalog_block_is_structural() {
        let doc = Html::parse_document("<html><body></body></html>");
        let mut fields = Vec::new();
        assert!(extract(&doc, &mut fields).unwrap_err().is_structural());
    }
}
