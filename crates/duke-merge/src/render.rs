//! Template rendering for one data row

use std::collections::HashMap;

use duke_merge_core::{CellValue, Worksheet};
use duke_merge_docx::DocxDocument;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::resolver::{parse_reference, relative_reference, resolve_address};

/// Text substituted for a cell value
///
/// Missing and empty cells become the empty string. Formula cells use their
/// cached result.
pub fn stringify(value: Option<&CellValue>) -> String {
    let Some(value) = value else {
        return String::new();
    };

    match value.effective_value() {
        CellValue::Empty | CellValue::Formula { .. } => String::new(),
        CellValue::Boolean(true) => "True".to_string(),
        CellValue::Boolean(false) => "False".to_string(),
        CellValue::Number(n) => format_number(*n),
        CellValue::String(s) => s.to_string(),
        CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        CellValue::Time(t) => t.format("%H:%M:%S").to_string(),
        CellValue::Error(e) => e.as_str().to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n == 0.0 {
        // covers -0.0
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Fill a copy of `template` with the values of data row `row` (1-based)
///
/// `mappings` goes from token to a cell reference whose column letters are
/// reapplied to `row`. Each body paragraph and each table cell paragraph is
/// processed on its own: mapped tokens found in the text are replaced in
/// mapping order, and the paragraph is rewritten only when its text changed.
/// Without `preserve_run_formatting` a rewritten paragraph becomes a single
/// plain run.
pub fn render(
    template: &DocxDocument,
    row: u32,
    mappings: &IndexMap<String, String>,
    sheet: Option<&Worksheet>,
    preserve_run_formatting: bool,
) -> DocxDocument {
    let mut document = template.clone();
    let mut resolved: HashMap<&str, String> = HashMap::new();

    for mut paragraph in document.paragraphs_mut() {
        let original = paragraph.text();
        let mut text = original.clone();
        let mut replacements: Vec<(&str, String)> = Vec::new();

        for (token, cell_ref) in mappings {
            if token.is_empty() || !text.contains(token.as_str()) {
                continue;
            }
            let value = resolved
                .entry(token.as_str())
                .or_insert_with(|| token_value(sheet, token, cell_ref, row))
                .clone();
            text = text.replace(token.as_str(), &value);
            replacements.push((token.as_str(), value));
        }

        if text == original {
            continue;
        }

        if preserve_run_formatting {
            let pairs: Vec<(&str, &str)> = replacements
                .iter()
                .map(|(token, value)| (*token, value.as_str()))
                .collect();
            paragraph.replace_preserving_runs(&pairs);
        } else {
            paragraph.set_text(&text);
        }
        debug!(row, tokens = replacements.len(), "paragraph updated");
    }

    document
}

fn token_value(sheet: Option<&Worksheet>, token: &str, cell_ref: &str, row: u32) -> String {
    let addr = match relative_reference(cell_ref, row).and_then(|r| parse_reference(&r)) {
        Ok(addr) => addr,
        Err(err) => {
            warn!(row, token, error = %err, "token left empty");
            return String::new();
        }
    };
    let value = sheet.and_then(|sheet| resolve_address(sheet, addr));
    stringify(value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use duke_merge_core::CellError;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Read, Write};

    const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn template(body: &str) -> DocxDocument {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("[Content_Types].xml", options).unwrap();
            zip.write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#).unwrap();
            zip.start_file("word/document.xml", options).unwrap();
            let xml = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><w:document {}><w:body>{}</w:body></w:document>"#,
                NS, body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        DocxDocument::read(Cursor::new(buf)).unwrap()
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", text)
    }

    fn map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect()
    }

    fn sheet() -> Worksheet {
        let mut ws = Worksheet::new("Data");
        ws.set_cell_value("B5", "Alice").unwrap();
        ws.set_cell_value("C5", 42).unwrap();
        ws.set_cell_value("B6", "Bob").unwrap();
        ws
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(None), "");
        assert_eq!(stringify(Some(&CellValue::Empty)), "");
        assert_eq!(stringify(Some(&CellValue::Number(42.0))), "42");
        assert_eq!(stringify(Some(&CellValue::Number(3.5))), "3.5");
        assert_eq!(stringify(Some(&CellValue::Number(-0.0))), "0");
        assert_eq!(stringify(Some(&CellValue::Number(-12.0))), "-12");
        assert_eq!(stringify(Some(&CellValue::Boolean(true))), "True");
        assert_eq!(stringify(Some(&CellValue::Boolean(false))), "False");
        assert_eq!(stringify(Some(&CellValue::from("x y"))), "x y");
        assert_eq!(stringify(Some(&CellValue::Error(CellError::Div0))), "#DIV/0!");

        let dt = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(stringify(Some(&CellValue::DateTime(dt))), "2024-01-31 00:00:00");
        let t = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(stringify(Some(&CellValue::Time(t))), "09:05:07");

        let cached = CellValue::formula("=1/4", Some(CellValue::Number(0.25)));
        assert_eq!(stringify(Some(&cached)), "0.25");
        assert_eq!(stringify(Some(&CellValue::formula("=X()", None))), "");
    }

    #[test]
    fn test_render_row() {
        let doc = template(&para("Hello ${name}, total ${amt}"));
        let mappings = map(&[("${name}", "B1"), ("${amt}", "C1")]);
        let ws = sheet();

        let out = render(&doc, 5, &mappings, Some(&ws), false);
        assert_eq!(out.body_paragraph_texts(), vec!["Hello Alice, total 42"]);

        let out = render(&doc, 6, &mappings, Some(&ws), false);
        assert_eq!(out.body_paragraph_texts(), vec!["Hello Bob, total "]);

        assert_eq!(
            doc.body_paragraph_texts(),
            vec!["Hello ${name}, total ${amt}"]
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let doc = template(&para("${name}/${name}/${other}"));
        let out = render(&doc, 5, &map(&[("${name}", "B2")]), Some(&sheet()), false);
        assert_eq!(out.body_paragraph_texts(), vec!["Alice/Alice/${other}"]);
    }

    #[test]
    fn test_malformed_reference_is_isolated() {
        let doc = template(&para("${bad}|${name}"));
        let mappings = map(&[("${bad}", "12"), ("${name}", "B1")]);
        let out = render(&doc, 5, &mappings, Some(&sheet()), false);
        assert_eq!(out.body_paragraph_texts(), vec!["|Alice"]);
    }

    #[test]
    fn test_column_past_sheet_edge_is_isolated() {
        let doc = template(&para("${far}|${wide}|${name}"));
        let mappings = map(&[("${far}", "ZZZZ1"), ("${wide}", "XFE3"), ("${name}", "B1")]);
        let out = render(&doc, 5, &mappings, Some(&sheet()), false);
        assert_eq!(out.body_paragraph_texts(), vec!["||Alice"]);
    }

    #[test]
    fn test_text_box_left_alone() {
        let text_box = r#"<w:r><mc:AlternateContent xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"><mc:Choice Requires="wps"><w:drawing><wp:anchor xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><w:txbxContent><w:p><w:r><w:t>${name}</w:t></w:r></w:p></w:txbxContent></wp:anchor></w:drawing></mc:Choice><mc:Fallback><w:pict><w:txbxContent><w:p><w:r><w:t>${name}</w:t></w:r></w:p></w:txbxContent></w:pict></mc:Fallback></mc:AlternateContent></w:r>"#;
        let mappings = map(&[("${name}", "B1")]);

        let logo = template(&format!("<w:p><w:r><w:t>Logo</w:t></w:r>{}</w:p>", text_box));
        let out = render(&logo, 5, &mappings, Some(&sheet()), false);
        assert_eq!(out.body_paragraph_texts(), vec!["Logo"]);
        let xml = document_xml(&out);
        assert!(xml.contains("txbxContent"));
        assert_eq!(xml.matches("${name}").count(), 2);

        let greeting = template(&format!(
            "<w:p><w:r><w:t>Dear ${{name}}</w:t></w:r>{}</w:p>",
            text_box
        ));
        let out = render(&greeting, 5, &mappings, Some(&sheet()), true);
        assert_eq!(out.body_paragraph_texts(), vec!["Dear Alice"]);
        let xml = document_xml(&out);
        assert!(xml.contains("mc:AlternateContent"));
        assert_eq!(xml.matches("${name}").count(), 2);
    }

    #[test]
    fn test_no_sheet_gives_empty_values() {
        let doc = template(&para("[${name}]"));
        let out = render(&doc, 5, &map(&[("${name}", "B1")]), None, false);
        assert_eq!(out.body_paragraph_texts(), vec!["[]"]);
    }

    #[test]
    fn test_table_cells_rendered() {
        let body = format!(
            "{}<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
            para("Dear ${name}"),
            para("${amt}"),
            para("plain")
        );
        let doc = template(&body);
        let mappings = map(&[("${name}", "B1"), ("${amt}", "C1")]);
        let out = render(&doc, 5, &mappings, Some(&sheet()), false);

        assert_eq!(out.body_paragraph_texts(), vec!["Dear Alice"]);
        assert_eq!(
            out.table_cell_texts(),
            vec![vec![vec!["42".to_string()], vec!["plain".to_string()]]]
        );
    }

    fn document_xml(doc: &DocxDocument) -> String {
        let bytes = doc.to_bytes().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn test_flattening_drops_run_formatting() {
        let body = "<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Hi </w:t></w:r><w:r><w:t>${name}</w:t></w:r></w:p>";
        let doc = template(body);
        let mappings = map(&[("${name}", "B1")]);

        let flat = render(&doc, 5, &mappings, Some(&sheet()), false);
        assert_eq!(flat.body_paragraph_texts(), vec!["Hi Alice"]);
        assert!(!document_xml(&flat).contains("<w:b/>"));

        let kept = render(&doc, 5, &mappings, Some(&sheet()), true);
        assert_eq!(kept.body_paragraph_texts(), vec!["Hi Alice"]);
        assert!(document_xml(&kept).contains("<w:b/>"));
    }

    #[test]
    fn test_unchanged_paragraph_untouched() {
        let body = "<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>no tokens</w:t></w:r></w:p>";
        let doc = template(body);
        let out = render(&doc, 5, &map(&[("${name}", "B1")]), Some(&sheet()), false);
        assert_eq!(out.body_paragraph_texts(), vec!["no tokens"]);
        assert!(document_xml(&out).contains("<w:i/>"));
    }
}
