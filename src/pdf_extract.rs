// src/pdf_extract.rs

use crate::error::InputError;
use lazy_static::lazy_static;
use lopdf::{Dictionary, Document};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Non-whitespace characters a text-layer measurement report always has.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages above which the whole document counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

lazy_static! {
    /// Every measurement report names at least one of these.
    static ref REPORT_MARKER: Regex =
        Regex::new(r"(?i)\b(?:roof|area|pitch|squares?|ridges?|eaves?)\b")
            .expect("built-in pattern must compile");
}

/// Reject text that cannot be a roof measurement report.
pub fn check_report_text(text: &str) -> Result<(), InputError> {
    if REPORT_MARKER.is_match(text) {
        Ok(())
    } else {
        warn!(chars = text.chars().count(), "No roof measurement terms in report text");
        Err(InputError::NotARoofReport)
    }
}

/// Text layer of a measurement report PDF. Scanned reports are refused
/// since nothing downstream can read them.
pub fn extract_report_text(pdf_bytes: &[u8]) -> Result<String, InputError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| InputError::Pdf(format!("Failed to parse PDF: {e}")))?;

    let (image_only, pages) = image_only_pages(&doc);
    if pages > 0 && image_only as f64 / pages as f64 >= SCANNED_PAGE_RATIO {
        info!(pages, image_only, "Report pages are images only");
        return Err(InputError::ScannedDocument);
    }

    let text = pdf_extract::extract_text_from_mem(pdf_bytes).map_err(|e| {
        warn!(error = %e, "No text layer could be read from the report");
        InputError::ScannedDocument
    })?;

    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < MIN_TEXT_CHARS {
        info!(chars = meaningful, pages, "Report text too short, treating as scanned");
        return Err(InputError::ScannedDocument);
    }
    check_report_text(&text)?;
    info!(chars = meaningful, pages, "Report text extracted");
    Ok(text)
}

/// `(image-only pages, total pages)`. A page whose resources carry
/// images but no fonts is image-only.
fn image_only_pages(doc: &Document) -> (usize, usize) {
    let pages = doc.get_pages();
    let image_only = pages
        .values()
        .filter_map(|id| doc.get_object(*id).ok())
        .filter_map(|obj| obj.as_dict().ok())
        .filter(|page| has_resource(doc, page, b"XObject") && !has_resource(doc, page, b"Font"))
        .count();
    debug!(pages = pages.len(), image_only, "Page resource check");
    (image_only, pages.len())
}

fn has_resource(doc: &Document, page: &Dictionary, key: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|x| doc.dereference(x).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|d| !d.is_empty())
}

/// Read a report from disk. PDFs go through text extraction; anything else
/// is read as UTF-8 text. Either way the text must look like a roof report.
pub fn read_report(path: &Path) -> Result<String, InputError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return extract_report_text(&fs::read(path)?);
    }

    let text = fs::read_to_string(path)?;
    check_report_text(&text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_report(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_garbage_bytes() {
        let err = extract_report_text(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, InputError::Pdf(_)));
    }

    #[test]
    fn test_read_plain_text_report() {
        let path = temp_report("roof-report.txt", b"Total Area = 2,500\n");
        let text = read_report(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(text, "Total Area = 2,500\n");
    }

    #[test]
    fn test_text_without_roof_terms_rejected() {
        let path = temp_report("invoice.txt", b"Invoice #4411\nAmount due: 120.00 USD\n");
        let err = read_report(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, InputError::NotARoofReport));
    }

    #[test]
    fn test_report_markers() {
        assert!(check_report_text("Predominant Pitch = 6/12").is_ok());
        assert!(check_report_text("ROOF MEASUREMENTS").is_ok());
        assert!(check_report_text("Eaves/Starter = 180 ft").is_ok());
        assert!(check_report_text("Thank you for your order").is_err());
        assert!(check_report_text("Areal photo only").is_err());
    }

    #[test]
    fn test_read_invalid_pdf_is_rejected() {
        let path = temp_report("roof-report.pdf", b"%PDF-garbage");
        let err = read_report(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, InputError::Pdf(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = read_report(Path::new("/nonexistent/report.txt")).unwrap_err();
        assert!(matches!(err, InputError::Io(_)));
    }
}
