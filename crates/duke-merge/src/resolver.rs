//! Cell reference resolution against the loaded sheet

use duke_merge_core::{CellAddress, CellValue, Worksheet};
use lazy_regex::regex_is_match;

use crate::error::{MergeError, MergeResult};

/// Parse a strict `letters + digits` reference (case-insensitive)
pub fn parse_reference(cell_ref: &str) -> MergeResult<CellAddress> {
    if !regex_is_match!(r"^[A-Za-z]+[0-9]+$", cell_ref) {
        return Err(MergeError::Reference(cell_ref.to_string()));
    }
    CellAddress::parse(cell_ref).map_err(|_| MergeError::Reference(cell_ref.to_string()))
}

/// Value at `cell_ref` on `sheet`
///
/// Returns `None` when no sheet is loaded, the reference is malformed or out
/// of range, or the cell holds nothing. Formula cells yield their cached
/// result.
pub fn resolve(sheet: Option<&Worksheet>, cell_ref: &str) -> Option<CellValue> {
    let sheet = sheet?;
    let addr = parse_reference(cell_ref).ok()?;
    resolve_address(sheet, addr)
}

/// Value at an already parsed address
pub fn resolve_address(sheet: &Worksheet, addr: CellAddress) -> Option<CellValue> {
    let value = sheet.cell_at(addr.row, addr.col)?.effective_value();
    if value.is_empty() {
        None
    } else {
        Some(value.clone())
    }
}

/// Reference to the same column as `cell_ref` on data row `row` (1-based)
///
/// The stored row number is ignored: only the letters of `cell_ref` are
/// kept, so `"B2"` on row 7 becomes `"B7"`.
pub fn relative_reference(cell_ref: &str, row: u32) -> MergeResult<String> {
    let letters: String = cell_ref
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return Err(MergeError::Reference(cell_ref.to_string()));
    }
    Ok(format!("{}{}", letters.to_ascii_uppercase(), row))
}
