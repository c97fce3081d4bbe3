//! DOCX package and paragraph access

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{DocxError, DocxResult};
use crate::xml::{Element, Node, XmlDocument};

const DEFAULT_MAIN_PART: &str = "word/document.xml";

/// A Word document: every package part as read, plus the parsed main part
///
/// Cloning is cheap for the untouched parts; they are shared.
#[derive(Debug, Clone)]
pub struct DocxDocument {
    /// (part name, bytes) in archive order
    parts: Vec<(String, Arc<[u8]>)>,
    /// Name of the main document part
    main_part: String,
    /// Parsed main document part
    document: XmlDocument,
}

impl DocxDocument {
    /// Open a document from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> DocxResult<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening document");
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Read a document from a reader
    pub fn read<R: Read + Seek>(reader: R) -> DocxResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;

        if archive.by_name("[Content_Types].xml").is_err() {
            return Err(DocxError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            parts.push((file.name().to_string(), Arc::from(bytes)));
        }

        let main_part = Self::find_main_part(&parts)?;
        let document = parts
            .iter()
            .find(|(name, _)| *name == main_part)
            .map(|(_, bytes)| XmlDocument::parse(bytes))
            .ok_or_else(|| DocxError::MissingPart(main_part.clone()))??;

        if document.root.local_name() != "document" {
            return Err(DocxError::InvalidFormat(format!(
                "main part root is <{}>, expected a document",
                document.root.name
            )));
        }

        Ok(Self {
            parts,
            main_part,
            document,
        })
    }

    /// Locate the main part through the package relationships
    fn find_main_part(parts: &[(String, Arc<[u8]>)]) -> DocxResult<String> {
        let Some((_, rels)) = parts.iter().find(|(name, _)| name == "_rels/.rels") else {
            return Ok(DEFAULT_MAIN_PART.to_string());
        };

        let mut reader = Reader::from_reader(&rels[..]);
        reader.trim_text(true);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"Relationship" => {
                    let mut target = None;
                    let mut is_main = false;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Target" => {
                                target = attr.unescape_value().ok().map(|s| s.to_string())
                            }
                            b"Type" => {
                                is_main = attr
                                    .unescape_value()
                                    .map_or(false, |s| s.ends_with("/officeDocument"))
                            }
                            _ => {}
                        }
                    }
                    if let (true, Some(target)) = (is_main, target) {
                        return Ok(target.trim_start_matches('/').to_string());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(DEFAULT_MAIN_PART.to_string())
    }

    /// Save the document to a file path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DocxResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the document to a writer
    pub fn write<W: Write + Seek>(&self, writer: W) -> DocxResult<()> {
        let mut zip = zip::ZipWriter::new(writer);
        let options = zip::write::SimpleFileOptions::default();

        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            if *name == self.main_part {
                zip.write_all(&self.document.to_bytes()?)?;
            } else {
                zip.write_all(bytes)?;
            }
        }

        zip.finish()?;
        Ok(())
    }

    /// Serialize the whole package into memory
    pub fn to_bytes(&self) -> DocxResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Names of all parts in the package
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    fn body(&self) -> Option<&Element> {
        self.document.root.elements().find(|e| e.local_name() == "body")
    }

    fn body_mut(&mut self) -> Option<&mut Element> {
        self.document.root.child_named_mut("body")
    }

    /// Text of every top-level body paragraph, in order
    pub fn body_paragraph_texts(&self) -> Vec<String> {
        self.body()
            .map(|body| {
                body.elements()
                    .filter(|e| e.local_name() == "p")
                    .map(paragraph_text)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text of every paragraph of every top-level table, by table, row and cell
    pub fn table_cell_texts(&self) -> Vec<Vec<Vec<String>>> {
        let Some(body) = self.body() else {
            return Vec::new();
        };

        body.elements()
            .filter(|e| e.local_name() == "tbl")
            .map(|tbl| {
                tbl.elements()
                    .filter(|e| e.local_name() == "tr")
                    .flat_map(|tr| tr.elements().filter(|e| e.local_name() == "tc"))
                    .map(|tc| {
                        tc.elements()
                            .filter(|e| e.local_name() == "p")
                            .map(paragraph_text)
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    /// Every paragraph a merge rewrites: the top-level body paragraphs, then
    /// the paragraphs directly inside each cell of each top-level table
    pub fn paragraphs_mut(&mut self) -> Vec<Paragraph<'_>> {
        let mut paragraphs = Vec::new();
        let Some(body) = self.body_mut() else {
            return paragraphs;
        };

        let mut tables = Vec::new();
        for node in body.children.iter_mut() {
            if let Node::Element(el) = node {
                match el.local_name() {
                    "p" => paragraphs.push(Paragraph { element: el }),
                    "tbl" => tables.push(el),
                    _ => {}
                }
            }
        }

        for tbl in tables {
            for tr in tbl.children_named_mut("tr") {
                for tc in tr.children_named_mut("tc") {
                    paragraphs.extend(
                        tc.children_named_mut("p")
                            .map(|element| Paragraph { element }),
                    );
                }
            }
        }

        paragraphs
    }
}

/// A paragraph (`w:p`) inside a loaded document
#[derive(Debug)]
pub struct Paragraph<'a> {
    element: &'a mut Element,
}

impl Paragraph<'_> {
    /// Visible text: run text with tabs as `\t` and breaks as `\n`
    pub fn text(&self) -> String {
        paragraph_text(self.element)
    }

    /// Replace the paragraph content with a single plain run
    ///
    /// Paragraph properties are kept; run formatting is not.
    pub fn set_text(&mut self, text: &str) {
        let p = &mut *self.element;
        p.children.retain(|node| {
            matches!(node, Node::Element(el) if el.local_name() == "pPr")
        });

        let mut run = Element::new(p.qualified("r"));
        let mut pending = String::new();

        for c in text.chars() {
            match c {
                '\t' | '\n' | '\r' => {
                    flush_text(&mut run, &mut pending);
                    let name = run.qualified(if c == '\t' { "tab" } else { "br" });
                    run.children.push(Node::Element(Element::new(name)));
                }
                _ => pending.push(c),
            }
        }
        flush_text(&mut run, &mut pending);

        if !run.children.is_empty() {
            p.children.push(Node::Element(run));
        }
    }

    /// Replace tokens inside individual text elements, keeping run formatting
    ///
    /// Replacements apply in order, each over the result of the previous one.
    /// When a token is split across runs the per-run result differs from the
    /// whole-text result, and the paragraph is flattened with
    /// [`set_text`](Self::set_text) instead. Returns whether the text changed.
    pub fn replace_preserving_runs(&mut self, replacements: &[(&str, &str)]) -> bool {
        let original = self.text();
        let target = apply_replacements(&original, replacements);
        if target == original {
            return false;
        }

        visit_text_elements(self.element, &mut |t| {
            let current = t.text();
            let replaced = apply_replacements(&current, replacements);
            if replaced != current {
                t.set_text(&replaced);
                t.set_attr("xml:space", "preserve");
            }
        });

        if self.text() != target {
            tracing::debug!("token split across runs, flattening paragraph");
            self.set_text(&target);
        }
        true
    }
}

/// Apply `(token, value)` replacements in order, skipping absent tokens
pub fn apply_replacements(text: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = text.to_string();
    for (token, value) in replacements {
        if !token.is_empty() && result.contains(token) {
            result = result.replace(token, value);
        }
    }
    result
}

fn flush_text(run: &mut Element, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    let mut t = Element::new(run.qualified("t"));
    t.set_attr("xml:space", "preserve");
    t.set_text(pending);
    run.children.push(Node::Element(t));
    pending.clear();
}

fn paragraph_text(p: &Element) -> String {
    let mut text = String::new();
    collect_text(p, &mut text);
    text
}

/// Elements that hold runs of the paragraph itself
///
/// Anything else (drawings, text boxes, deleted runs) has text of its own
/// that is not part of the paragraph.
fn is_run_container(local: &str) -> bool {
    matches!(
        local,
        "hyperlink" | "ins" | "smartTag" | "fldSimple" | "customXml" | "sdt" | "sdtContent"
    )
}

fn collect_text(el: &Element, out: &mut String) {
    for child in el.elements() {
        match child.local_name() {
            "r" => {
                for item in child.elements() {
                    match item.local_name() {
                        "t" => out.push_str(&item.text()),
                        "tab" => out.push('\t'),
                        "br" | "cr" => out.push('\n'),
                        _ => {}
                    }
                }
            }
            local if is_run_container(local) => collect_text(child, out),
            _ => {}
        }
    }
}

fn visit_text_elements(el: &mut Element, f: &mut dyn FnMut(&mut Element)) {
    for node in el.children.iter_mut() {
        if let Node::Element(child) = node {
            match child.local_name() {
                "r" => {
                    for t in child.children_named_mut("t") {
                        f(t);
                    }
                }
                local if is_run_container(local) => visit_text_elements(child, f),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn package(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();

            zip.start_file("[Content_Types].xml", options).unwrap();
            zip.write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#).unwrap();

            zip.start_file("_rels/.rels", options).unwrap();
            zip.write_all(br#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#).unwrap();

            zip.start_file("word/document.xml", options).unwrap();
            let xml = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {}><w:body>{}<w:sectPr/></w:body></w:document>"#,
                NS, body
            );
            zip.write_all(xml.as_bytes()).unwrap();

            zip.start_file("word/styles.xml", options).unwrap();
            zip.write_all(b"<w:styles/>").unwrap();

            zip.finish().unwrap();
        }
        buf
    }

    fn open(body: &str) -> DocxDocument {
        DocxDocument::read(Cursor::new(package(body))).unwrap()
    }

    #[test]
    fn test_paragraph_text() {
        let doc = open(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>Hello</w:t></w:r><w:r><w:tab/><w:t xml:space="preserve"> ${name}</w:t><w:br/></w:r><w:hyperlink><w:r><w:t>link</w:t></w:r></w:hyperlink></w:p><w:p/>"#,
        );
        assert_eq!(
            doc.body_paragraph_texts(),
            vec!["Hello\t ${name}\nlink".to_string(), String::new()]
        );
    }

    const TEXT_BOX: &str = r#"<w:r><mc:AlternateContent xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"><mc:Choice Requires="wps"><w:drawing><wp:anchor xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><wps:txbx xmlns:wps="http://schemas.microsoft.com/office/word/2010/wordprocessingShape"><w:txbxContent><w:p><w:r><w:t>${name}</w:t></w:r></w:p></w:txbxContent></wps:txbx></wp:anchor></w:drawing></mc:Choice><mc:Fallback><w:pict><v:shape xmlns:v="urn:schemas-microsoft-com:vml"><v:textbox><w:txbxContent><w:p><w:r><w:t>${name}</w:t></w:r></w:p></w:txbxContent></v:textbox></v:shape></w:pict></mc:Fallback></mc:AlternateContent></w:r>"#;

    #[test]
    fn test_text_box_is_not_paragraph_text() {
        let doc = open(&format!(
            r#"<w:p><w:r><w:t>Logo</w:t></w:r>{}</w:p>"#,
            TEXT_BOX
        ));
        assert_eq!(doc.body_paragraph_texts(), vec!["Logo".to_string()]);
    }

    #[test]
    fn test_run_containers_and_deleted_text() {
        let doc = open(
            r#"<w:p><w:ins><w:r><w:t>new </w:t></w:r></w:ins><w:del><w:r><w:delText>old </w:delText></w:r></w:del><w:smartTag><w:r><w:t>tag </w:t></w:r></w:smartTag><w:fldSimple w:instr="PAGE"><w:r><w:t>1</w:t></w:r></w:fldSimple></w:p>"#,
        );
        assert_eq!(doc.body_paragraph_texts(), vec!["new tag 1".to_string()]);
    }

    #[test]
    fn test_replace_leaves_text_box_alone() {
        let mut doc = open(&format!(
            r#"<w:p><w:r><w:t>Dear ${{name}}</w:t></w:r>{}</w:p>"#,
            TEXT_BOX
        ));
        assert!(doc.paragraphs_mut()[0].replace_preserving_runs(&[("${name}", "Ann")]));
        assert_eq!(doc.body_paragraph_texts(), vec!["Dear Ann".to_string()]);

        let xml = String::from_utf8(doc.document.to_bytes().unwrap()).unwrap();
        assert_eq!(xml.matches("<w:t>${name}</w:t>").count(), 2);
        assert!(xml.contains("mc:AlternateContent"));
    }

    #[test]
    fn test_paragraphs_include_table_cells() {
        let mut doc = open(
            r#"<w:p><w:r><w:t>top</w:t></w:r></w:p><w:tbl><w:tblPr/><w:tr><w:tc><w:tcPr/><w:p><w:r><w:t>c1</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>c2a</w:t></w:r></w:p><w:p><w:r><w:t>c2b</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let texts: Vec<_> = doc.paragraphs_mut().iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["top", "c1", "c2a", "c2b"]);
        assert_eq!(
            doc.table_cell_texts(),
            vec![vec![vec!["c1".to_string()], vec!["c2a".to_string(), "c2b".to_string()]]]
        );
    }

    #[test]
    fn test_set_text_keeps_paragraph_properties() {
        let mut doc = open(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>${a}</w:t></w:r></w:p>"#,
        );
        {
            let mut paragraphs = doc.paragraphs_mut();
            paragraphs[0].set_text("x\ty\nz");
        }
        assert_eq!(doc.body_paragraph_texts(), vec!["x\ty\nz".to_string()]);

        let xml = String::from_utf8(doc.document.to_bytes().unwrap()).unwrap();
        assert!(xml.contains(r#"<w:jc w:val="center"/>"#));
        assert!(!xml.contains("<w:b/>"));
    }

    #[test]
    fn test_set_text_empty_leaves_empty_paragraph() {
        let mut doc = open(r#"<w:p><w:r><w:t>${gone}</w:t></w:r></w:p>"#);
        doc.paragraphs_mut()[0].set_text("");
        assert_eq!(doc.body_paragraph_texts(), vec![String::new()]);
    }

    #[test]
    fn test_replace_preserving_runs() {
        let mut doc = open(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Dear ${name},</w:t></w:r><w:r><w:t xml:space="preserve"> you owe ${amount}</w:t></w:r></w:p>"#,
        );
        let changed =
            doc.paragraphs_mut()[0].replace_preserving_runs(&[("${name}", "Ann"), ("${amount}", "5")]);
        assert!(changed);
        assert_eq!(
            doc.body_paragraph_texts(),
            vec!["Dear Ann, you owe 5".to_string()]
        );

        let xml = String::from_utf8(doc.document.to_bytes().unwrap()).unwrap();
        assert!(xml.contains("<w:b/>"));
    }

    #[test]
    fn test_replace_split_token_falls_back_to_flat_text() {
        let mut doc = open(
            r#"<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>${na</w:t></w:r><w:r><w:t>me}!</w:t></w:r></w:p>"#,
        );
        assert!(doc.paragraphs_mut()[0].replace_preserving_runs(&[("${name}", "Ann")]));
        assert_eq!(doc.body_paragraph_texts(), vec!["Ann!".to_string()]);
    }

    #[test]
    fn test_replace_without_tokens_is_untouched() {
        let mut doc = open(r#"<w:p><w:r><w:t>plain</w:t></w:r></w:p>"#);
        let before = doc.document.clone();
        assert!(!doc.paragraphs_mut()[0].replace_preserving_runs(&[("${x}", "1")]));
        assert_eq!(doc.document, before);
    }

    #[test]
    fn test_apply_replacements_in_order() {
        assert_eq!(
            apply_replacements("${a} ${b}", &[("${a}", "${b}"), ("${b}", "B")]),
            "B B"
        );
        assert_eq!(apply_replacements("none", &[("${a}", "x")]), "none");
    }

    #[test]
    fn test_roundtrip_keeps_other_parts() {
        let mut doc = open(r#"<w:p><w:r><w:t>${x}</w:t></w:r></w:p>"#);
        doc.paragraphs_mut()[0].set_text("done");

        let bytes = doc.to_bytes().unwrap();
        let reread = DocxDocument::read(Cursor::new(bytes)).unwrap();
        assert_eq!(reread.body_paragraph_texts(), vec!["done".to_string()]);
        assert_eq!(
            reread.part_names().collect::<Vec<_>>(),
            vec!["[Content_Types].xml", "_rels/.rels", "word/document.xml", "word/styles.xml"]
        );
    }

    #[test]
    fn test_not_a_document() {
        assert!(matches!(
            DocxDocument::read(Cursor::new(b"nope".to_vec())),
            Err(DocxError::Zip(_))
        ));
    }
}
