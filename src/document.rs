use std::cell::OnceCell;

use anyhow::Result;
use serde::Serialize;

use crate::fit::Canvas;
use crate::geometry::Rect;

/// A piece of positioned text as reported by a page's text layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFragment {
    pub bbox: Rect,
    pub text: String,
}

impl TextFragment {
    pub fn new(bbox: Rect, text: impl Into<String>) -> Self {
        Self {
            bbox,
            text: text.into(),
        }
    }
}

/// Read access to the text layer of a paginated document.
pub trait TextSource {
    fn page_count(&self) -> usize;
    /// Fragments of one page, in the order the text layer emits them.
    fn text_fragments(&self, page: usize) -> Result<Vec<TextFragment>>;
}

/// Write access to the pages of a document, one page at a time.
pub trait PageSurface {
    type Canvas<'a>: Canvas
    where
        Self: 'a;

    fn page_count(&self) -> usize;
    fn canvas(&mut self, page: usize) -> Result<Self::Canvas<'_>>;
}

/// Fragments of one page, queried from the source on first use.
pub struct PageTextIndex<'a, S: TextSource + ?Sized> {
    source: &'a S,
    page: usize,
    fragments: OnceCell<Vec<TextFragment>>,
}

impl<'a, S: TextSource + ?Sized> PageTextIndex<'a, S> {
    pub fn new(source: &'a S, page: usize) -> Self {
        Self {
            source,
            page,
            fragments: OnceCell::new(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn fragments(&self) -> Result<&[TextFragment]> {
        if let Some(fragments) = self.fragments.get() {
            return Ok(fragments);
        }
        let fragments = self.source.text_fragments(self.page)?;
        Ok(self.fragments.get_or_init(|| fragments))
    }

    /// Fragments whose box touches or overlaps `rect`, in read order.
    pub fn intersecting(&self, rect: &Rect) -> Result<impl Iterator<Item = &TextFragment>> {
        let rect = *rect;
        Ok(self
            .fragments()?
            .iter()
            .filter(move |fragment| fragment.bbox.intersects(&rect)))
    }
}
