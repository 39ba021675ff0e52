pub mod cell;
pub mod sheet;
pub mod workbook;

pub use cell::Cell;
pub use sheet::{Row, Sheet, StoreError};
pub use workbook::Workbook;

/// Well-known persistence file in the working directory.
pub const STORE_FILE: &str = "zakupki.json";
