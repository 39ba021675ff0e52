//! Portal endpoints and the fixed extended-search query template.

use chrono::NaiveDate;

pub const BASE_URL: &str = "https://zakupki.gov.ru";

pub const EXTENDED_SEARCH_URL: &str =
    "https://zakupki.gov.ru/epz/order/extendedsearch/results.html";
pub const SUPPLIER_RESULTS_URL: &str =
    "https://zakupki.gov.ru/epz/order/notice/ea44/view/supplier-results.html";
pub const COMMON_INFO_URL: &str =
    "https://zakupki.gov.ru/epz/order/notice/ea44/view/common-info.html";
pub const DOCUMENTS_URL: &str =
    "https://zakupki.gov.ru/epz/order/notice/ea44/view/documents.html";

/// The portal's extended-search form state. Every toggle here has to be sent
/// on each request or the result set silently changes.
static SEARCH_TEMPLATE: &[(&str, &str)] = &[
    ("morphology", "on"),
    ("sortDirection", "false"),
    ("recordsPerPage", "_50"),
    ("showLotsInfoHidden", "false"),
    ("sortBy", "UPDATE_DATE"),
    ("fz44", "on"),
    ("fz223", "on"),
    ("af", "on"),
    ("ca", "on"),
    ("pc", "on"),
    ("pa", "on"),
    ("priceContractAdvantages44IdNameHidden", "%7B%7D"),
    ("priceContractAdvantages94IdNameHidden", "%7B%7D"),
    ("currencyIdGeneral", "-1"),
    ("selectedSubjectsIdNameHidden", "%7B%7D"),
    ("OrderPlacementSmallBusinessSubject", "on"),
    ("OrderPlacementRnpData", "on"),
    ("OrderPlacementExecutionRequirement", "on"),
    ("orderPlacement94_0", "0"),
    ("orderPlacement94_1", "0"),
    ("orderPlacement94_2", "0"),
    ("contractPriceCurrencyId", "-1"),
    ("budgetLevelIdNameHidden", "%7B%7D"),
    ("nonBudgetTypesIdNameHidden", "%7B%7D"),
];

/// Build the full query for one search page: the fixed template plus the
/// free-text INN filter, the publish-date window and the page number.
pub fn search_query(
    inn: &str,
    from: NaiveDate,
    to: NaiveDate,
    page: u32,
) -> Vec<(&'static str, String)> {
    let mut query: Vec<(&'static str, String)> = SEARCH_TEMPLATE
        .iter()
        .map(|&(k, v)| (k, v.to_string()))
        .collect();
    query.push(("searchString", inn.to_string()));
    query.push(("publishDateFrom", from.format("%d.%m.%Y").to_string()));
    query.push(("publishDateTo", to.format("%d.%m.%Y").to_string()));
    query.push(("pageNumber", page.to_string()));
    query
}

/// Detail pages are keyed by the procurement's registration number alone.
pub fn reg_number_query(number: &str) -> Vec<(&'static str, String)> {
    vec![("regNumber", number.to_string())]
}
