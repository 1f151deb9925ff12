//! Table geometry used to resolve structured references
//!
//! A [`TableGeometry`] is supplied by the workbook reader for every table (list object)
//! in the source file. Positions are 0-based, matching [`CellAddress`].

use crate::cell::{CellAddress, CellRange};
use crate::error::TableError;
use crate::MAX_COLS;
use ahash::{AHashMap, AHashSet};

/// Bounding geometry of one structured table
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableGeometry {
    /// Table name as used in formulas (`Sales` in `Sales[Amount]`)
    pub table_name: String,
    /// Sheet the table lives on
    pub anchor_sheet: String,
    /// Row index of the header row
    pub header_row: u32,
    /// Row index of the first data row
    pub first_data_row: u32,
    /// Row index of the last data row (inclusive)
    pub last_data_row: u32,
    /// Column index of the leftmost table column
    pub first_column: u16,
    /// Column names, left to right
    pub column_names: Vec<String>,
}

impl TableGeometry {
    /// Build a table whose header row starts at `header` and whose data rows directly follow
    /// it, `data_rows` rows deep.
    ///
    /// ```
    /// use sheetshift_core::{CellAddress, TableGeometry};
    ///
    /// let table = TableGeometry::from_header(
    ///     "Sales",
    ///     "Sheet1",
    ///     CellAddress::parse("B2").unwrap(),
    ///     8,
    ///     ["Amount", "Date"],
    /// );
    /// assert_eq!(table.data_range().to_string(), "B3:C10");
    /// ```
    pub fn from_header<I, S>(
        table_name: impl Into<String>,
        anchor_sheet: impl Into<String>,
        header: CellAddress,
        data_rows: u32,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let first_data_row = header.row + 1;
        Self {
            table_name: table_name.into(),
            anchor_sheet: anchor_sheet.into(),
            header_row: header.row,
            first_data_row,
            last_data_row: (first_data_row + data_rows).saturating_sub(1),
            first_column: header.col,
            column_names: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the invariants reference resolution relies on
    pub fn validate(&self) -> Result<(), TableError> {
        if self.table_name.trim().is_empty() {
            return Err(TableError::EmptyName);
        }
        if self.column_names.is_empty() {
            return Err(TableError::NoColumns(self.table_name.clone()));
        }
        if self.header_row >= self.first_data_row || self.first_data_row > self.last_data_row {
            return Err(TableError::InvalidRows {
                table: self.table_name.clone(),
                header_row: self.header_row,
                first_data_row: self.first_data_row,
                last_data_row: self.last_data_row,
            });
        }
        if self.first_column as usize + self.column_names.len() > MAX_COLS as usize {
            return Err(TableError::TooWide(self.table_name.clone()));
        }

        let mut seen = AHashSet::with_capacity(self.column_names.len());
        for name in &self.column_names {
            if !seen.insert(name.to_uppercase()) {
                return Err(TableError::DuplicateColumn {
                    table: self.table_name.clone(),
                    column: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Index (0-based, relative to the table) of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.to_uppercase();
        self.column_names
            .iter()
            .position(|c| c.to_uppercase() == wanted)
    }

    /// Worksheet column index of a table column
    pub fn sheet_column(&self, index: usize) -> u16 {
        self.first_column + index as u16
    }

    fn last_column(&self) -> u16 {
        self.sheet_column(self.column_names.len() - 1)
    }

    /// Data body (all rows below the header)
    pub fn data_range(&self) -> CellRange {
        CellRange::new(
            CellAddress::new(self.first_data_row, self.first_column),
            CellAddress::new(self.last_data_row, self.last_column()),
        )
    }

    /// Header row plus data body
    pub fn full_range(&self) -> CellRange {
        CellRange::new(
            CellAddress::new(self.header_row, self.first_column),
            CellAddress::new(self.last_data_row, self.last_column()),
        )
    }

    /// Text that differs whenever the geometry differs
    pub fn fingerprint(&self) -> String {
        format!(
            "{:?}@{:?}:{}:{}-{}:{}:{:?}",
            self.table_name,
            self.anchor_sheet,
            self.header_row,
            self.first_data_row,
            self.last_data_row,
            self.first_column,
            self.column_names
        )
    }

    /// Whether `cell` on `sheet` lies inside the data body
    pub fn data_contains(&self, sheet: &str, cell: &CellAddress) -> bool {
        self.anchor_sheet.eq_ignore_ascii_case(sheet) && self.data_range().contains(cell)
    }
}

/// A validated set of tables, indexed by name
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: Vec<TableGeometry>,
    by_name: AHashMap<String, usize>,
}

impl TableSet {
    /// Validate every table and index them by upper-cased name
    pub fn new(tables: impl IntoIterator<Item = TableGeometry>) -> Result<Self, TableError> {
        let mut set = Self::default();
        for table in tables {
            table.validate()?;
            let key = table.table_name.to_uppercase();
            if set.by_name.contains_key(&key) {
                return Err(TableError::DuplicateTable(table.table_name));
            }
            set.by_name.insert(key, set.tables.len());
            set.tables.push(table);
        }
        Ok(set)
    }

    /// Look up a table by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&TableGeometry> {
        self.by_name
            .get(&name.to_uppercase())
            .map(|&idx| &self.tables[idx])
    }

    /// The table whose data body contains `cell` on `sheet`
    pub fn enclosing(&self, sheet: &str, cell: &CellAddress) -> Option<&TableGeometry> {
        self.tables.iter().find(|t| t.data_contains(sheet, cell))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableGeometry> {
        self.tables.iter()
    }

    /// Fingerprints of every table, ordered by name so input order does not matter
    pub fn fingerprint(&self) -> String {
        let mut tables: Vec<&TableGeometry> = self.tables.iter().collect();
        tables.sort_by_key(|t| t.table_name.to_uppercase());
        tables
            .iter()
            .map(|t| t.fingerprint())
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sales() -> TableGeometry {
        TableGeometry::from_header(
            "Sales",
            "Sheet1",
            CellAddress::parse("B2").unwrap(),
            8,
            ["Amount", "Date"],
        )
    }

    #[test]
    fn test_ranges() {
        let table = sales();
        assert_eq!(table.data_range().to_string(), "B3:C10");
        assert_eq!(table.full_range().to_string(), "B2:C10");
        assert_eq!(table.column_index("date"), Some(1));
        assert_eq!(table.column_index("Missing"), None);
        assert_eq!(table.sheet_column(1), 2);
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let mut table = sales();
        table.column_names.push("AMOUNT".into());
        assert_eq!(
            table.validate(),
            Err(TableError::DuplicateColumn {
                table: "Sales".into(),
                column: "AMOUNT".into()
            })
        );
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let mut table = sales();
        table.first_data_row = table.header_row;
        assert!(matches!(
            table.validate(),
            Err(TableError::InvalidRows { .. })
        ));

        let empty = TableGeometry::from_header(
            "Empty",
            "Sheet1",
            CellAddress::new(0, 0),
            0,
            ["A"],
        );
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_table_set_lookup_and_enclosing() {
        let set = TableSet::new([sales()]).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("SALES").is_some());
        assert!(set.get("Other").is_none());

        let inside = CellAddress::parse("C5").unwrap();
        let header = CellAddress::parse("C2").unwrap();
        assert!(set.enclosing("Sheet1", &inside).is_some());
        assert!(set.enclosing("sheet1", &inside).is_some());
        assert!(set.enclosing("Sheet2", &inside).is_none());
        assert!(set.enclosing("Sheet1", &header).is_none());
    }

    #[test]
    fn test_table_set_rejects_duplicates() {
        let err = TableSet::new([sales(), sales()]).unwrap_err();
        assert_eq!(err, TableError::DuplicateTable("Sales".into()));
    }

    #[test]
    fn test_fingerprint_tracks_geometry() {
        let moved = TableGeometry::from_header(
            "Sales",
            "Sheet1",
            CellAddress::parse("F20").unwrap(),
            8,
            ["Amount", "Date"],
        );
        assert_eq!(sales().fingerprint(), sales().fingerprint());
        assert_ne!(sales().fingerprint(), moved.fingerprint());

        let other = TableGeometry::from_header("Costs", "Sheet2", CellAddress::new(0, 0), 3, ["Cost"]);
        let forward = TableSet::new([sales(), other.clone()]).unwrap();
        let backward = TableSet::new([other, sales()]).unwrap();
        assert_eq!(forward.fingerprint(), backward.fingerprint());
        assert_eq!(forward.iter().count(), 2);
        assert_eq!(TableSet::default().fingerprint(), "");
    }
}
