//! PDF support for the built-in engine.
//!
//! Metadata and page counts come from lopdf. Rasterization needs a real
//! renderer, so `render_page` binds the platform PDFium library at runtime;
//! when PDFium is not installed, rendering fails recoverably and metadata
//! extraction simply reports no cover.

use super::EngineError;
use crate::models::BookMetadata;
use lopdf::{Document, Object};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Width used when rendering page 1 as the cover thumbnail.
const COVER_WIDTH: u32 = 300;

pub fn extract_metadata(path: &Path) -> Result<BookMetadata, EngineError> {
    let doc = load_document(path)?;

    let mut title = None;
    let mut author = None;
    if let Some(info) = info_dict(&doc) {
        title = dict_string(info, b"Title").filter(|s| !s.trim().is_empty());
        author = dict_string(info, b"Author").filter(|s| !s.trim().is_empty());
    }

    let total_units = doc.get_pages().len() as u32;

    // First page as cover; no PDFium means no cover, not a failure.
    let cover_data = if total_units > 0 {
        render_page(path, 1, COVER_WIDTH).ok()
    } else {
        None
    };

    Ok(BookMetadata {
        title,
        author,
        cover_data,
        total_units,
    })
}

pub fn page_count(path: &Path) -> Result<u32, EngineError> {
    let doc = load_document(path)?;
    Ok(doc.get_pages().len() as u32)
}

/// Rasterize one page (1-based) to PNG bytes at `target_width` pixels.
pub fn render_page(path: &Path, page: u32, target_width: u32) -> Result<Vec<u8>, EngineError> {
    if !path.exists() {
        return Err(EngineError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|err| EngineError::Parse {
            message: format!("failed to load PDF: {err}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as u32;
    if page < 1 || page > total {
        return Err(EngineError::OutOfRange { index: page, total });
    }

    let page = pages
        .get((page - 1) as u16)
        .map_err(|err| EngineError::Parse {
            message: format!("failed to get page: {err}"),
        })?;

    let aspect_ratio = page.height().value / page.width().value;
    let target_height = (target_width as f32 * aspect_ratio) as i32;
    let config = PdfRenderConfig::new()
        .set_target_width(target_width as i32)
        .set_target_height(target_height);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|err| EngineError::Parse {
            message: format!("failed to render page: {err}"),
        })?;

    let mut png = Vec::new();
    bitmap
        .as_image()
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|err| EngineError::Parse {
            message: format!("failed to encode PNG: {err}"),
        })?;

    Ok(png)
}

fn load_document(path: &Path) -> Result<Document, EngineError> {
    if !path.exists() {
        return Err(EngineError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    Document::load(path).map_err(|err| EngineError::Parse {
        message: format!("failed to load PDF: {err}"),
    })
}

fn bind_pdfium() -> Result<Pdfium, EngineError> {
    let bindings = Pdfium::bind_to_system_library().map_err(|err| EngineError::Parse {
        message: format!("PDFium library not available: {err}"),
    })?;
    Ok(Pdfium::new(bindings))
}

/// The Info entry may be inline or a reference; resolve either.
fn info_dict(doc: &Document) -> Option<&lopdf::Dictionary> {
    let info = doc.trailer.get(b"Info").ok()?;
    let object = match info {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    object.as_dict().ok()
}

fn dict_string(dict: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
    let value = dict.get(key).ok()?;
    match value {
        Object::String(data, _) => Some(String::from_utf8_lossy(data).to_string()),
        Object::Name(name) => Some(String::from_utf8_lossy(name).to_string()),
        _ => None,
    }
}
