//! Office Open XML loaders (`.docx`, `.pptx`, `.xlsx`).
//!
//! Workbooks go through calamine. Word and PowerPoint parts are streamed with quick-xml
//! straight out of the zip container so each slide keeps its own page number.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use quick_xml::events::Event;

use crate::domain::{Document, DocumentMetadata, SourceFormat};
use crate::error::{AppError, LOADER_FAILED};

use super::text::source_label;
use super::DocumentLoader;

type Archive = zip::ZipArchive<File>;

/// Whole document as one text, one line per paragraph.
pub struct WordLoader;

impl DocumentLoader for WordLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Word
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let mut archive = open_archive(path)?;
        let xml = read_part(&mut archive, "word/document.xml", path)?.ok_or_else(|| {
            AppError::new(LOADER_FAILED, "Word file has no document body")
                .with_details(format!("path={}", path.display()))
        })?;

        Ok(vec![Document::new(
            paragraphs_text(&xml, b"w:p", b"w:t").map_err(xml_error(path, "word/document.xml"))?,
            DocumentMetadata::new(source_label(path), SourceFormat::Word),
        )])
    }
}

/// One document per slide; `page` is the slide number.
pub struct PowerPointLoader;

impl DocumentLoader for PowerPointLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::PowerPoint
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let mut archive = open_archive(path)?;
        let source = source_label(path);

        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
            .collect();
        slides.sort();
        if slides.is_empty() {
            return Err(AppError::new(LOADER_FAILED, "Presentation has no slides")
                .with_details(format!("path={}", path.display())));
        }

        let mut out = Vec::with_capacity(slides.len());
        for (number, name) in slides {
            let xml = read_part(&mut archive, &name, path)?.unwrap_or_default();
            out.push(Document::new(
                paragraphs_text(&xml, b"a:p", b"a:t").map_err(xml_error(path, &name))?,
                DocumentMetadata::new(&source, SourceFormat::PowerPoint).with_page(number),
            ));
        }
        Ok(out)
    }
}

fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// One document per worksheet; rows on their own lines, cells joined by ` | `.
pub struct ExcelLoader;

impl DocumentLoader for ExcelLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Excel
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| {
            AppError::new(LOADER_FAILED, "Failed to open workbook")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let source = source_label(path);

        let sheet_names: Vec<String> = workbook.sheet_names().iter().map(|s| s.to_string()).collect();
        let mut out = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            let range = match workbook.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    tracing::warn!(source = %source, sheet = %name, error = %e, "worksheet unreadable");
                    continue;
                }
            };
            out.push(Document::new(
                range_text(&range),
                DocumentMetadata::new(&source, SourceFormat::Excel).with_sheet(name),
            ));
        }
        Ok(out)
    }
}

/// Dense rows of the used range. Empty rows are skipped; gaps inside a row keep their column.
fn range_text(range: &Range<Data>) -> String {
    range
        .rows()
        .filter_map(|row| {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            let last = cells.iter().rposition(|c| !c.is_empty())?;
            Some(cells[..=last].join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Text of each `para` element (text runs concatenated), blank paragraphs dropped.
fn paragraphs_text(xml: &str, para: &[u8], run: &[u8]) -> Result<String, quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == run => in_run = true,
            Event::End(e) if e.name().as_ref() == run => in_run = false,
            Event::End(e) if e.name().as_ref() == para => {
                if !current.trim().is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current.clear();
            }
            Event::Text(t) if in_run => current.push_str(&t.unescape()?),
            Event::CData(c) if in_run => current.push_str(&String::from_utf8_lossy(&c)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}

fn xml_error<'a>(path: &'a Path, part: &'a str) -> impl FnOnce(quick_xml::Error) -> AppError + 'a {
    move |e| {
        AppError::new(LOADER_FAILED, "Archive part is not well-formed XML")
            .with_details(format!("path={}; part={}; err={}", path.display(), part, e))
    }
}

fn open_archive(path: &Path) -> Result<Archive, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(LOADER_FAILED, "Failed to open file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    zip::ZipArchive::new(file).map_err(|e| {
        AppError::new(LOADER_FAILED, "File is not a valid Office archive")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn read_part(archive: &mut Archive, name: &str, path: &Path) -> Result<Option<String>, AppError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(AppError::new(LOADER_FAILED, "Failed to read archive part")
                .with_details(format!("path={}; part={}; err={}", path.display(), name, e)))
        }
    };
    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(|e| {
        AppError::new(LOADER_FAILED, "Archive part is not valid UTF-8 XML")
            .with_details(format!("path={}; part={}; err={}", path.display(), name, e))
    })?;
    Ok(Some(xml))
}
