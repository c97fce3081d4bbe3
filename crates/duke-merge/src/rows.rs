//! Data row enumeration

use duke_merge_core::{CellValue, Worksheet};

/// Rows above the data in the usual input layout
pub const DEFAULT_HEADER_ROWS: u32 = 3;

/// Which rows count as data rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowPolicy {
    /// A row with a value in any column
    #[default]
    AnyColumn,
    /// A row with a value in column A
    FirstColumn,
}

impl std::str::FromStr for RowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any-column" | "any" => Ok(RowPolicy::AnyColumn),
            "first-column" | "first" => Ok(RowPolicy::FirstColumn),
            other => Err(format!("unknown row policy '{}'", other)),
        }
    }
}

fn has_value(value: &CellValue) -> bool {
    !value.effective_value().is_empty()
}

/// 1-based numbers of the data rows below `header_rows`, ascending
///
/// Rows run from `header_rows + 1` to the last populated row.
pub fn enumerate_rows(sheet: &Worksheet, header_rows: u32, policy: RowPolicy) -> Vec<u32> {
    sheet
        .populated_rows()
        .filter(|&idx| idx >= header_rows)
        .filter(|&idx| match policy {
            RowPolicy::AnyColumn => sheet.iter_row(idx).any(|(_, v)| has_value(v)),
            RowPolicy::FirstColumn => sheet.cell_at(idx, 0).map_or(false, has_value),
        })
        .map(|idx| idx + 1)
        .collect()
}
