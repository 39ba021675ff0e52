use super::Cell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ID_COLUMN: &str = "ID";

/// A materialized row: field name → value. Fields never written to a row are
/// simply absent, even when the column exists elsewhere in the sheet.
pub type Row = BTreeMap<String, Cell>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row index {index} out of range for sheet of {len} rows")]
    OutOfRange { index: usize, len: usize },
}

/// A dynamically-schemaed row store.
///
/// Columns are the union of every field name ever written, kept in
/// first-seen order with `ID` always first. `ID` is assigned on append,
/// monotonically increasing, and is never rewritten by `set`. Rows are never
/// deleted.
#[derive(Debug, Serialize, Deserialize)]
pub struct Sheet {
    columns: Vec<String>,
    rows: Vec<Row>,
    #[serde(skip)]
    next_id: i64,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    pub fn new() -> Self {
        Sheet {
            columns: vec![ID_COLUMN.to_string()],
            rows: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild the derived state after deserialization: seed the `ID` column
    /// on an empty backing store and recompute the next free `ID` as one
    /// more than the maximum present.
    pub(crate) fn restore(&mut self) {
        if self.columns.is_empty() {
            self.columns.push(ID_COLUMN.to_string());
        }
        self.next_id = self
            .rows
            .iter()
            .filter_map(|row| row.get(ID_COLUMN).and_then(Cell::as_i64))
            .max()
            .map_or(1, |max| max + 1);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, index: usize) -> Result<Row, StoreError> {
        self.rows.get(index).cloned().ok_or(StoreError::OutOfRange {
            index,
            len: self.rows.len(),
        })
    }

    /// Merge the given fields into row `index`. Unseen field names extend
    /// the column set for the whole sheet; the `ID` field is ignored.
    pub fn set<I, S>(&mut self, index: usize, record: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (S, Cell)>,
        S: Into<String>,
    {
        let len = self.rows.len();
        if index >= len {
            return Err(StoreError::OutOfRange { index, len });
        }
        for (name, value) in record {
            let name = name.into();
            if name == ID_COLUMN {
                continue;
            }
            self.ensure_column(&name);
            self.rows[index].insert(name, value);
        }
        Ok(())
    }

    /// Append a row, assigning the next free `ID`. Returns the assigned id.
    pub fn append<I, S>(&mut self, record: I) -> i64
    where
        I: IntoIterator<Item = (S, Cell)>,
        S: Into<String>,
    {
        let id = self.next_id;
        self.next_id += 1;
        let mut row = Row::new();
        row.insert(ID_COLUMN.to_string(), Cell::Int(id));
        self.rows.push(row);
        let index = self.rows.len() - 1;
        // cannot be out of range, the row was just pushed
        let _ = self.set(index, record);
        id
    }

    fn ensure_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[(&str, Cell)]) -> Vec<(String, Cell)> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn append_assigns_monotonic_ids() {
        let mut sheet = Sheet::new();
        assert_eq!(sheet.append(rec(&[("name", "a".into())])), 1);
        assert_eq!(sheet.append(rec(&[("name", "b".into())])), 2);
        assert_eq!(sheet.append(rec(&[("name", "c".into())])), 3);
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet.get(1).unwrap().get("ID"), Some(&Cell::Int(2)));
    }

    #[test]
    fn id_column_is_always_first() {
        let mut sheet = Sheet::new();
        sheet.append(rec(&[("state", "pending".into()), ("INN", "77".into())]));
        assert_eq!(sheet.columns()[0], "ID");
    }

    #[test]
    fn unseen_fields_extend_the_schema() {
        let mut sheet = Sheet::new();
        sheet.append(rec(&[("name", "a".into())]));
        sheet
            .set(0, rec(&[("customer", "МУЗ ГКБ".into())]))
            .unwrap();
        assert!(sheet.columns().contains(&"customer".to_string()));
        // the earlier column survives
        assert!(sheet.columns().contains(&"name".to_string()));
    }

    #[test]
    fn set_merges_and_never_touches_id() {
        let mut sheet = Sheet::new();
        sheet.append(rec(&[("state", "pending".into())]));
        sheet
            .set(0, rec(&[("state", "done".into()), ("ID", Cell::Int(99))]))
            .unwrap();
        let row = sheet.get(0).unwrap();
        assert_eq!(row.get("ID"), Some(&Cell::Int(1)));
        assert_eq!(row.get("state").and_then(Cell::as_str), Some("done"));
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut sheet = Sheet::new();
        assert!(matches!(
            sheet.get(0),
            Err(StoreError::OutOfRange { index: 0, len: 0 })
        ));
        assert!(sheet.set(5, rec(&[("x", "y".into())])).is_err());
    }

    #[test]
    fn restore_continues_id_sequence() {
        let mut sheet = Sheet::new();
        sheet.append(rec(&[("name", "a".into())]));
        sheet.append(rec(&[("name", "b".into())]));
        let json = serde_json::to_string(&sheet).unwrap();
        let mut back: Sheet = serde_json::from_str(&json).unwrap();
        back.restore();
        assert_eq!(back.append(rec(&[("name", "c".into())])), 3);
    }
}
