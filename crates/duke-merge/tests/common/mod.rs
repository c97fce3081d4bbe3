//! Fixture builders shared by the integration tests
#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use duke_merge::{CellValue, DocxDocument, Workbook};
use duke_merge_xlsx::XlsxWriter;

const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

/// A paragraph holding `text` in one run
pub fn para(text: &str) -> String {
    format!(
        "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        text
    )
}

/// A one-row table, one paragraph per cell
pub fn table(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|c| format!("<w:tc>{}</w:tc>", para(c)))
        .collect();
    format!("<w:tbl><w:tr>{}</w:tr></w:tbl>", cells)
}

/// Write a minimal Word package whose body is `body`
pub fn write_template(path: &Path, body: &str) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#).unwrap();

    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#).unwrap();

    zip.start_file("word/document.xml", options).unwrap();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {}><w:body>{}<w:sectPr/></w:body></w:document>"#,
        NS, body
    );
    zip.write_all(xml.as_bytes()).unwrap();

    zip.finish().unwrap();
}

/// Write a workbook whose first sheet holds `cells` below a 3-row header
pub fn write_sheet(path: &Path, cells: &[(&str, CellValue)]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.worksheet_mut(0).unwrap();
    sheet.set_name("Data");
    sheet.set_cell_value("A1", "Report").unwrap();
    sheet.set_cell_value("A2", "generated").unwrap();
    sheet.set_cell_value("A3", "Name").unwrap();
    sheet.set_cell_value("B3", "Amount").unwrap();
    for (address, value) in cells {
        sheet.set_cell_value(address, value.clone()).unwrap();
    }
    XlsxWriter::write_file(&workbook, path).unwrap();
}

/// Body paragraph texts of a generated document
pub fn texts(path: &Path) -> Vec<String> {
    DocxDocument::open(path).unwrap().body_paragraph_texts()
}

/// Sorted names of the files in `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn out(dir: &Path, n: usize) -> PathBuf {
    dir.join(format!("document_{}.docx", n))
}
