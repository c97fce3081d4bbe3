//! Write workbooks with the writer, read them back with the reader

use std::io::Cursor;

use chrono::{NaiveDate, NaiveTime};
use duke_merge_core::{CellError, CellValue, Workbook};
use duke_merge_xlsx::{XlsxReader, XlsxWriter};
use pretty_assertions::assert_eq;

fn roundtrip(workbook: &Workbook) -> Workbook {
    let mut buf = Cursor::new(Vec::new());
    XlsxWriter::write(workbook, &mut buf).expect("write");
    buf.set_position(0);
    XlsxReader::read(buf).expect("read")
}

#[test]
fn values_survive_roundtrip() {
    let mut wb = Workbook::new();
    let ws = wb.worksheet_mut(0).unwrap();
    ws.set_cell_value("A4", "Alice & <Bob>").unwrap();
    ws.set_cell_value("B4", 42).unwrap();
    ws.set_cell_value("C4", 3.25).unwrap();
    ws.set_cell_value("D4", true).unwrap();
    ws.set_cell_value("E4", CellError::Na).unwrap();
    ws.set_cell_value("F4", "  padded  ").unwrap();

    let read = roundtrip(&wb);
    let ws = read.active_worksheet().unwrap();

    assert_eq!(ws.get_value("A4").unwrap().as_string(), Some("Alice & <Bob>"));
    assert_eq!(ws.get_value("B4").unwrap(), CellValue::Number(42.0));
    assert_eq!(ws.get_value("C4").unwrap(), CellValue::Number(3.25));
    assert_eq!(ws.get_value("D4").unwrap(), CellValue::Boolean(true));
    assert_eq!(ws.get_value("E4").unwrap(), CellValue::Error(CellError::Na));
    assert_eq!(ws.get_value("F4").unwrap().as_string(), Some("  padded  "));
    assert_eq!(ws.cell_count(), 6);
}

#[test]
fn dates_and_times_roundtrip() {
    let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(9, 15, 30)
        .unwrap();
    let t = NaiveTime::from_hms_opt(17, 45, 0).unwrap();

    for date_1904 in [false, true] {
        let mut wb = Workbook::new();
        wb.settings_mut().date_1904 = date_1904;
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_cell_value("A1", dt).unwrap();
        ws.set_cell_value("B1", t).unwrap();

        let read = roundtrip(&wb);
        assert_eq!(read.settings().date_1904, date_1904);
        let ws = read.active_worksheet().unwrap();
        assert_eq!(ws.get_value("A1").unwrap(), CellValue::DateTime(dt));
        assert_eq!(ws.get_value("B1").unwrap(), CellValue::Time(t));
    }
}

#[test]
fn formulas_keep_cached_values() {
    let mut wb = Workbook::new();
    let ws = wb.worksheet_mut(0).unwrap();
    ws.set_cell_value("A1", 2).unwrap();
    ws.set_cell_value("B1", CellValue::formula("=A1*21", Some(CellValue::Number(42.0))))
        .unwrap();
    ws.set_cell_value("C1", CellValue::formula("=\"a\"&\"b\"", Some(CellValue::string("ab"))))
        .unwrap();
    ws.set_cell_value("D1", CellValue::formula("=TODAY()", None))
        .unwrap();

    let read = roundtrip(&wb);
    let ws = read.active_worksheet().unwrap();

    let b1 = ws.get_value("B1").unwrap();
    assert_eq!(b1.formula_text(), Some("=A1*21"));
    assert_eq!(b1.as_number(), Some(42.0));
    assert_eq!(ws.get_value("C1").unwrap().as_string(), Some("ab"));
    assert!(ws.get_value("D1").unwrap().effective_value().is_empty());
}

#[test]
fn active_sheet_roundtrip() {
    let mut wb = Workbook::new();
    wb.add_worksheet_with_name("People").unwrap();
    wb.worksheet_mut(1)
        .unwrap()
        .set_cell_value("A1", "from people")
        .unwrap();
    wb.set_active_sheet(1).unwrap();

    let read = roundtrip(&wb);
    assert_eq!(read.sheet_count(), 2);
    let active = read.active_worksheet().unwrap();
    assert_eq!(active.name(), "People");
    assert_eq!(active.get_value("A1").unwrap().as_string(), Some("from people"));
}

#[test]
fn write_and_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.xlsx");

    let mut wb = Workbook::new();
    wb.worksheet_mut(0)
        .unwrap()
        .set_cell_value("C7", "on disk")
        .unwrap();
    XlsxWriter::write_file(&wb, &path).unwrap();

    let read = XlsxReader::read_file(&path).unwrap();
    assert_eq!(
        read.active_worksheet().unwrap().get_value("C7").unwrap().as_string(),
        Some("on disk")
    );
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = XlsxReader::read_file(dir.path().join("absent.xlsx"));
    assert!(matches!(result, Err(duke_merge_xlsx::XlsxError::Io(_))));
}
