//! XLSX reader

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use chrono::NaiveDateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::styles::{read_styles_xml, CellFormats};
use duke_merge_core::datetime::{serial_to_datetime, serial_to_time};
use duke_merge_core::{CellAddress, CellError, CellValue, FormatKind, Workbook, Worksheet};

/// Decode Excel's `_xHHHH_` escape sequences in strings.
///
/// Excel uses this format to encode special characters in XML:
/// - `_x000d_` = CR (carriage return)
/// - `_x000a_` = LF (line feed)
/// - `_x0009_` = Tab
/// - `_x005f_` = Underscore (escaped underscore)
fn decode_excel_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find("_x") {
        result.push_str(&rest[..pos]);
        let candidate = &rest[pos..];

        let decoded = candidate
            .get(2..6)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .filter(|_| candidate.as_bytes().get(6) == Some(&b'_'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);

        match decoded {
            Some(c) => {
                result.push(c);
                rest = &candidate[7..];
            }
            None => {
                result.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Sheet list and workbook-wide flags from `xl/workbook.xml`
#[derive(Debug, Default)]
struct WorkbookInfo {
    /// (sheet name, relationship id) in tab order
    sheets: Vec<(String, String)>,
    date_1904: bool,
    active_tab: usize,
}

/// Everything a cell needs to turn its raw text into a value
struct CellContext<'a> {
    shared_strings: &'a [String],
    formats: &'a CellFormats,
    date_1904: bool,
}

/// Raw parts of a `<c>` element collected while it is being read
#[derive(Debug, Default)]
struct RawCell {
    reference: Option<String>,
    cell_type: Option<String>,
    style: Option<u32>,
    value: Option<String>,
    formula: Option<String>,
}

impl RawCell {
    fn from_element(e: &BytesStart<'_>) -> Self {
        let mut cell = RawCell::default();
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"r" => cell.reference = attr.unescape_value().ok().map(|s| s.to_string()),
                b"t" => cell.cell_type = attr.unescape_value().ok().map(|s| s.to_string()),
                b"s" => {
                    cell.style = attr
                        .unescape_value()
                        .ok()
                        .and_then(|s| s.parse::<u32>().ok())
                }
                _ => {}
            }
        }
        cell
    }
}

/// XLSX file reader
///
/// Reads cell values only. Formulas keep the result cached in the file and
/// are never recalculated.
pub struct XlsxReader;

impl XlsxReader {
    /// Read a workbook from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<Workbook> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "reading workbook");
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a workbook from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Workbook> {
        let mut archive = zip::ZipArchive::new(reader)?;

        // Verify this is an XLSX file
        if archive.by_name("[Content_Types].xml").is_err() {
            return Err(XlsxError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }

        let shared_strings = Self::read_shared_strings(&mut archive)?;
        let formats = Self::read_styles(&mut archive)?;
        let info = Self::read_workbook_xml(&mut archive)?;
        let sheet_paths = Self::read_workbook_rels(&mut archive)?;

        let mut workbook = Workbook::empty();
        workbook.settings_mut().date_1904 = info.date_1904;

        let ctx = CellContext {
            shared_strings: &shared_strings,
            formats: &formats,
            date_1904: info.date_1904,
        };

        let mut active_index = None;
        for (tab, (name, r_id)) in info.sheets.iter().enumerate() {
            let Some(path) = sheet_paths.get(r_id) else {
                tracing::warn!(sheet = %name, r_id = %r_id, "sheet has no worksheet part, skipped");
                continue;
            };

            let sheet_idx = workbook.add_worksheet_with_name(name)?;
            if tab == info.active_tab {
                active_index = Some(sheet_idx);
            }
            if let Some(worksheet) = workbook.worksheet_mut(sheet_idx) {
                Self::read_worksheet(&mut archive, path, worksheet, &ctx)?;
                tracing::debug!(
                    sheet = %name,
                    cells = worksheet.cell_count(),
                    "worksheet read"
                );
            }
        }

        if workbook.is_empty() {
            return Err(XlsxError::InvalidFormat("workbook has no sheets".into()));
        }
        if let Some(index) = active_index {
            workbook.set_active_sheet(index)?;
        }

        Ok(workbook)
    }

    /// Read the shared strings table
    ///
    /// Rich text runs are concatenated; phonetic hints (`rPh`) are skipped.
    fn read_shared_strings<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<Vec<String>> {
        let mut strings = Vec::new();

        let file = match archive.by_name("xl/sharedStrings.xml") {
            Ok(f) => f,
            Err(_) => return Ok(strings), // No shared strings is valid
        };

        let reader = BufReader::new(file);
        let mut xml_reader = Reader::from_reader(reader);
        // Leading and trailing spaces are part of the value
        xml_reader.trim_text(false);

        let mut buf = Vec::new();
        let mut current_string = String::new();
        let mut in_si = false;
        let mut in_t = false;
        let mut in_phonetic = false;

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"si" => {
                        in_si = true;
                        current_string.clear();
                    }
                    b"rPh" => in_phonetic = true,
                    b"t" if in_si && !in_phonetic => in_t = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) if e.name().as_ref() == b"si" => {
                    strings.push(String::new());
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"si" => {
                        strings.push(decode_excel_escapes(&current_string));
                        current_string.clear();
                        in_si = false;
                    }
                    b"rPh" => in_phonetic = false,
                    b"t" => in_t = false,
                    _ => {}
                },
                Ok(Event::Text(e)) if in_t => {
                    let text = e.unescape()?;
                    current_string.push_str(&text);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(strings)
    }

    fn read_styles<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> XlsxResult<CellFormats> {
        match archive.by_name("xl/styles.xml") {
            Ok(file) => read_styles_xml(file),
            Err(_) => Ok(CellFormats::default()),
        }
    }

    /// Read workbook.xml to get sheet names, rIds, the date system and the active tab
    fn read_workbook_xml<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<WorkbookInfo> {
        let file = archive
            .by_name("xl/workbook.xml")
            .map_err(|_| XlsxError::MissingPart("xl/workbook.xml".into()))?;

        let reader = BufReader::new(file);
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut info = WorkbookInfo::default();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"sheet" => {
                        let mut name = None;
                        let mut r_id = None;

                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => {
                                    name = attr.unescape_value().ok().map(|s| s.to_string());
                                }
                                b"r:id" => {
                                    r_id = attr.unescape_value().ok().map(|s| s.to_string());
                                }
                                _ => {}
                            }
                        }

                        if let (Some(name), Some(r_id)) = (name, r_id) {
                            info.sheets.push((name, r_id));
                        }
                    }
                    b"workbookPr" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"date1904" {
                                info.date_1904 = attr
                                    .unescape_value()
                                    .ok()
                                    .map_or(false, |s| s.as_ref() == "1" || s.as_ref() == "true");
                            }
                        }
                    }
                    b"workbookView" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"activeTab" {
                                info.active_tab = attr
                                    .unescape_value()
                                    .ok()
                                    .and_then(|s| s.parse().ok())
                                    .unwrap_or(0);
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(info)
    }

    /// Read workbook.xml.rels to get sheet file paths
    fn read_workbook_rels<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<HashMap<String, String>> {
        let file = archive
            .by_name("xl/_rels/workbook.xml.rels")
            .map_err(|_| XlsxError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;

        let reader = BufReader::new(file);
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut rels = HashMap::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e))
                    if e.name().as_ref() == b"Relationship" =>
                {
                    let mut id = None;
                    let mut target = None;
                    let mut rel_type = None;

                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Id" => {
                                id = attr.unescape_value().ok().map(|s| s.to_string());
                            }
                            b"Target" => {
                                target = attr.unescape_value().ok().map(|s| s.to_string());
                            }
                            b"Type" => {
                                rel_type = attr.unescape_value().ok().map(|s| s.to_string());
                            }
                            _ => {}
                        }
                    }

                    // Only include worksheet relationships
                    if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                        if rel_type.ends_with("/worksheet") {
                            // Target is relative to xl/ folder
                            let full_path = match target.strip_prefix('/') {
                                Some(absolute) => absolute.to_string(),
                                None => format!("xl/{}", target),
                            };
                            rels.insert(id, full_path);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    fn read_worksheet<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
        path: &str,
        worksheet: &mut Worksheet,
        ctx: &CellContext<'_>,
    ) -> XlsxResult<()> {
        let file = archive
            .by_name(path)
            .map_err(|_| XlsxError::MissingPart(path.to_string()))?;

        let reader = BufReader::new(file);
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.trim_text(false);

        let mut buf = Vec::new();

        // Position used when a writer omits the `r` attributes
        let mut row_idx: u32 = 0;
        let mut next_col: u16 = 0;

        let mut current: Option<RawCell> = None;
        let mut in_value = false;
        let mut in_formula = false;
        let mut in_inline_str = false;
        let mut in_inline_text = false;
        let mut in_phonetic = false;

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"row" => {
                        row_idx = Self::row_index(&e).unwrap_or(row_idx);
                        next_col = 0;
                    }
                    b"c" => current = Some(RawCell::from_element(&e)),
                    b"v" if current.is_some() => in_value = true,
                    b"f" if current.is_some() => in_formula = true,
                    b"is" if current.is_some() => in_inline_str = true,
                    b"rPh" if in_inline_str => in_phonetic = true,
                    b"t" if in_inline_str && !in_phonetic => in_inline_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"row" => {
                        row_idx = Self::row_index(&e).map_or(row_idx + 1, |r| r + 1);
                        next_col = 0;
                    }
                    // Value-less cell; only advances the column position
                    b"c" => {
                        let cell = RawCell::from_element(&e);
                        let addr = Self::cell_address(&cell, row_idx, next_col)?;
                        next_col = addr.col.saturating_add(1);
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if let Some(cell) = current.as_mut() {
                        if in_value || in_inline_text {
                            cell.value
                                .get_or_insert_with(String::new)
                                .push_str(&e.unescape()?);
                        } else if in_formula {
                            cell.formula
                                .get_or_insert_with(String::new)
                                .push_str(&e.unescape()?);
                        }
                    }
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"row" => {
                        row_idx += 1;
                        next_col = 0;
                    }
                    b"c" => {
                        if let Some(cell) = current.take() {
                            let addr = Self::cell_address(&cell, row_idx, next_col)?;
                            next_col = addr.col.saturating_add(1);
                            if let Some(value) = Self::process_cell(&cell, ctx)? {
                                worksheet.set_cell_value_at(addr.row, addr.col, value)?;
                            }
                        }
                    }
                    b"v" => in_value = false,
                    b"f" => in_formula = false,
                    b"is" => in_inline_str = false,
                    b"rPh" => in_phonetic = false,
                    b"t" => in_inline_text = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(())
    }

    /// 0-based index from a `<row r="...">` element
    fn row_index(e: &BytesStart<'_>) -> Option<u32> {
        e.attributes()
            .flatten()
            .find(|attr| attr.key.as_ref() == b"r")
            .and_then(|attr| attr.unescape_value().ok()?.parse::<u32>().ok())
            .map(|r| r.saturating_sub(1))
    }

    fn cell_address(cell: &RawCell, row_idx: u32, next_col: u16) -> XlsxResult<CellAddress> {
        match cell.reference.as_deref() {
            Some(cell_ref) => CellAddress::parse(cell_ref).map_err(|e| {
                XlsxError::Parse(format!("Invalid cell reference '{}': {}", cell_ref, e))
            }),
            None => Ok(CellAddress::new(row_idx, next_col)),
        }
    }

    /// Turn the raw parts of a cell into its value
    ///
    /// Returns `None` for cells without a value.
    fn process_cell(cell: &RawCell, ctx: &CellContext<'_>) -> XlsxResult<Option<CellValue>> {
        let cell_type = cell.cell_type.as_deref();

        if let Some(f) = cell.formula.as_deref() {
            // A failed cached value is dropped rather than failing the sheet
            let cached = match cell.value.as_deref() {
                Some(v) => Self::typed_value(cell_type, v, cell.style, ctx).ok(),
                None => None,
            };

            let formula_text = if f.starts_with('=') {
                f.to_string()
            } else {
                format!("={}", f)
            };

            return Ok(Some(CellValue::formula(formula_text, cached)));
        }

        match cell.value.as_deref() {
            Some(v) => Self::typed_value(cell_type, v, cell.style, ctx).map(Some),
            None => Ok(None),
        }
    }

    fn typed_value(
        cell_type: Option<&str>,
        value: &str,
        style: Option<u32>,
        ctx: &CellContext<'_>,
    ) -> XlsxResult<CellValue> {
        let cell_value = match cell_type {
            // Shared string
            Some("s") => {
                let idx: usize = value.trim().parse().map_err(|_| {
                    XlsxError::Parse(format!("Invalid shared string index: {}", value))
                })?;
                let s = ctx.shared_strings.get(idx).ok_or_else(|| {
                    XlsxError::Parse(format!("Shared string index {} out of bounds", idx))
                })?;
                CellValue::string(s.as_str())
            }

            // Boolean
            Some("b") => CellValue::Boolean(value == "1" || value.eq_ignore_ascii_case("true")),

            // Error
            Some("e") => CellError::parse(value)
                .map(CellValue::Error)
                .unwrap_or_else(|| CellValue::string(value)),

            // Inline or formula string - decode Excel escape sequences
            Some("inlineStr") | Some("str") => CellValue::string(decode_excel_escapes(value)),

            // ISO 8601 date
            Some("d") => Self::parse_iso_date(value)
                .map(CellValue::DateTime)
                .unwrap_or_else(|| CellValue::string(value)),

            // Number (default type or explicit "n")
            None | Some("n") => match value.trim().parse::<f64>() {
                Ok(n) => Self::number_value(n, ctx.formats.kind_of(style), ctx.date_1904),
                Err(_) => CellValue::string(value),
            },

            // Unknown type - treat as string
            Some(_) => CellValue::string(value),
        };

        Ok(cell_value)
    }

    /// Apply the cell's number format to a stored number
    fn number_value(n: f64, kind: FormatKind, date_1904: bool) -> CellValue {
        match kind {
            FormatKind::Number => CellValue::Number(n),
            FormatKind::Time if (0.0..1.0).contains(&n) => serial_to_time(n)
                .map(CellValue::Time)
                .unwrap_or(CellValue::Number(n)),
            FormatKind::Time | FormatKind::DateTime => serial_to_datetime(n, date_1904)
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Number(n)),
        }
    }

    fn parse_iso_date(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim().trim_end_matches('Z');
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}
