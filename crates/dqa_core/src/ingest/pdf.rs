use std::path::Path;

use crate::domain::{Document, DocumentMetadata, SourceFormat};
use crate::error::{AppError, LOADER_FAILED};

use super::text::source_label;
use super::DocumentLoader;

/// One document per page; `page` is 1-based.
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }

    fn load(&self, path: &Path) -> Result<Vec<Document>, AppError> {
        let source = source_label(path);
        let doc = lopdf::Document::load(path).map_err(|e| {
            AppError::new(LOADER_FAILED, "Failed to open PDF")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;

        let pages = doc.get_pages();
        let mut out = Vec::with_capacity(pages.len());
        for page_num in pages.keys() {
            // A single unreadable page should not drop the whole file.
            let text = match doc.extract_text(&[*page_num]) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(source = %source, page = page_num, error = %e, "failed to extract page text");
                    String::new()
                }
            };
            out.push(Document::new(
                text,
                DocumentMetadata::new(&source, SourceFormat::Pdf).with_page(*page_num),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn each_page_becomes_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("handbook.pdf");
        write_pdf(&p, &["Alpha page", "Beta page"]);

        let docs = PdfLoader.load(&p).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.page, Some(1));
        assert_eq!(docs[1].metadata.page, Some(2));
        assert!(docs[0].content.contains("Alpha page"), "got {:?}", docs[0].content);
        assert!(docs[1].content.contains("Beta page"), "got {:?}", docs[1].content);
        for d in &docs {
            assert_eq!(d.metadata.format, SourceFormat::Pdf);
            assert_eq!(d.metadata.source, p.display().to_string());
        }
    }

    #[test]
    fn garbage_bytes_are_a_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("broken.pdf");
        std::fs::write(&p, b"not a pdf at all").unwrap();
        let err = PdfLoader.load(&p).unwrap_err();
        assert_eq!(err.code, LOADER_FAILED);
    }
}
