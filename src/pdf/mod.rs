//! `lopdf`-backed implementation of the document provider.
//!
//! The core works in page-local coordinates with the origin at the top-left
//! corner of the MediaBox and y growing downwards. Everything in here converts
//! to and from PDF user space at the boundary.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use tracing::{debug, info};

use crate::document::{PageSurface, TextFragment, TextSource};
use crate::error::OverlayError;
use crate::font::OverlayFont;
use crate::geometry::Rect;

mod canvas;
mod embed;
mod text_layer;

pub use canvas::{OverlayStyle, PdfCanvas};

/// Parent-chain lookups stop here; deeper trees are treated as corrupt.
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub is_encrypted: bool,
}

pub struct PdfDocument {
    inner: Document,
    pages: Vec<ObjectId>,
    source: PathBuf,
    overlay: Option<Overlay>,
}

pub(crate) struct Overlay {
    font: Arc<OverlayFont>,
    style: OverlayStyle,
    embedded: embed::EmbeddedFont,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self, OverlayError> {
        let inner = Document::load(path).map_err(|err| OverlayError::DocumentOpen {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self::from_document(inner, path.to_path_buf()))
    }

    pub fn load_bytes(bytes: &[u8]) -> Result<Self, OverlayError> {
        let source = PathBuf::from("<memory>");
        let inner = Document::load_mem(bytes).map_err(|err| OverlayError::DocumentOpen {
            path: source.clone(),
            message: err.to_string(),
        })?;
        Ok(Self::from_document(inner, source))
    }

    fn from_document(inner: Document, source: PathBuf) -> Self {
        let pages = inner.get_pages().into_values().collect();
        Self {
            inner,
            pages,
            source,
            overlay: None,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_encrypted(&self) -> bool {
        self.inner.trailer.get(b"Encrypt").is_ok()
    }

    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            page_count: self.pages.len(),
            is_encrypted: self.is_encrypted(),
        }
    }

    /// Attaches the typeface used by every canvas of this document.
    pub fn attach_overlay(&mut self, font: Arc<OverlayFont>, style: OverlayStyle) {
        let embedded = embed::EmbeddedFont::reserve(&mut self.inner, Arc::clone(&font));
        self.overlay = Some(Overlay {
            font,
            style,
            embedded,
        });
    }

    /// Writes the document next to `path` and moves it into place once complete.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.finalize()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut file = tempfile::Builder::new()
            .prefix(".pdf-region-")
            .suffix(".pdf")
            .tempfile_in(&dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            self.inner
                .save_to(&mut writer)
                .with_context(|| "failed to write pdf")?;
            writer.flush().with_context(|| "failed to flush pdf")?;
        }
        file.persist(path)
            .with_context(|| format!("failed to persist {}", path.display()))?;
        info!(path = %path.display(), pages = self.pages.len(), "saved document");
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.finalize()?;
        let mut bytes = Vec::new();
        self.inner
            .save_to(&mut bytes)
            .with_context(|| "failed to write pdf")?;
        Ok(bytes)
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(overlay) = &self.overlay {
            overlay.embedded.write(&mut self.inner)?;
        }
        Ok(())
    }

    fn page_id(&self, page: usize) -> Result<ObjectId, OverlayError> {
        self.pages.get(page).copied().ok_or_else(|| {
            OverlayError::corrupt_page(page, format!("document has {} pages", self.pages.len()))
        })
    }
}

impl TextSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn text_fragments(&self, page: usize) -> Result<Vec<TextFragment>> {
        let page_id = self.page_id(page)?;
        let page_box = PageBox::of_page(&self.inner, page_id);
        let fragments = text_layer::page_fragments(&self.inner, page_id, &page_box)
            .map_err(|err| OverlayError::corrupt_page(page, format!("{err:#}")))?;
        debug!(page, fragments = fragments.len(), "read text layer");
        Ok(fragments)
    }
}

impl PageSurface for PdfDocument {
    type Canvas<'a> = PdfCanvas<'a>;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn canvas(&mut self, page: usize) -> Result<PdfCanvas<'_>> {
        let page_id = self.page_id(page)?;
        let overlay = self
            .overlay
            .as_mut()
            .ok_or_else(|| anyhow!("no overlay font attached to {}", self.source.display()))?;
        Ok(PdfCanvas::new(&mut self.inner, overlay, page_id))
    }
}

/// The page's MediaBox, normalised so that `llx <= urx` and `lly <= ury`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PageBox {
    llx: f32,
    lly: f32,
    urx: f32,
    ury: f32,
}

impl PageBox {
    /// US Letter, the PDF default when no MediaBox is present.
    const DEFAULT: PageBox = PageBox {
        llx: 0.0,
        lly: 0.0,
        urx: 612.0,
        ury: 792.0,
    };

    pub(crate) fn of_page(doc: &Document, page_id: ObjectId) -> Self {
        let values: Option<Vec<f32>> = inherited_attribute(doc, page_id, b"MediaBox").and_then(
            |object| match object {
                Object::Array(items) => items.iter().map(|item| number(resolve(doc, item))).collect(),
                _ => None,
            },
        );
        match values.as_deref() {
            Some([x0, y0, x1, y1]) => PageBox {
                llx: x0.min(*x1),
                lly: y0.min(*y1),
                urx: x0.max(*x1),
                ury: y0.max(*y1),
            },
            _ => Self::DEFAULT,
        }
    }

    /// Page-local point to PDF user space.
    pub(crate) fn to_user(&self, x: f32, y: f32) -> (f32, f32) {
        (self.llx + x, self.ury - y)
    }

    /// PDF user space point to page-local coordinates.
    pub(crate) fn to_local(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.llx, self.ury - y)
    }

    /// `[x, y, width, height]` of a page-local rect in user space, as `re` expects.
    pub(crate) fn user_rect(&self, rect: &Rect) -> [f32; 4] {
        let (x, y) = self.to_user(rect.x0, rect.y1);
        [x, y, rect.width(), rect.height()]
    }
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value).clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
