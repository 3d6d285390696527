use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::document::PageSurface;
use crate::fit::{Canvas, TextFitter};
use crate::translate::TranslatedRegion;

/// Extra vertical room given to replacement text.
///
/// The bottom margin is larger because descending strokes need more clearance
/// than marks above the headline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub top: f32,
    pub bottom: f32,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            top: 2.0,
            bottom: 14.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRegion {
    pub page: usize,
    pub region_name: String,
    pub font_size: f32,
}

/// A region that was erased but could not take its replacement text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfitRegion {
    pub page: usize,
    pub region_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    pub pages: usize,
    pub rendered: Vec<RenderedRegion>,
    pub skipped: usize,
    pub warnings: Vec<UnfitRegion>,
}

/// Per-region outcome; an instance is processed exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RegionState {
    Skipped,
    Rendered(f32),
    Unfit,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegionCompositor {
    fitter: TextFitter,
    padding: Padding,
}

impl RegionCompositor {
    pub fn new(fitter: TextFitter, padding: Padding) -> Self {
        Self { fitter, padding }
    }

    /// Erases each translated region and draws its replacement, page by page.
    pub fn apply<D: PageSurface>(
        &self,
        document: &mut D,
        translated: &[TranslatedRegion],
    ) -> Result<RenderReport> {
        let pages = document.page_count();
        let mut report = RenderReport {
            pages,
            ..RenderReport::default()
        };
        for stray in translated.iter().filter(|region| region.page >= pages) {
            warn!(
                page = stray.page,
                region = %stray.region_name,
                "region refers to a page the document does not have"
            );
        }

        for page in 0..pages {
            let mut canvas = document.canvas(page)?;
            for region in translated.iter().filter(|region| region.page == page) {
                match self.render_region(&mut canvas, region)? {
                    RegionState::Skipped => report.skipped += 1,
                    RegionState::Rendered(font_size) => report.rendered.push(RenderedRegion {
                        page,
                        region_name: region.region_name.clone(),
                        font_size,
                    }),
                    RegionState::Unfit => {
                        warn!(
                            page,
                            region = %region.region_name,
                            "replacement text did not fit; region left blank"
                        );
                        report.warnings.push(UnfitRegion {
                            page,
                            region_name: region.region_name.clone(),
                        });
                    }
                }
            }
            canvas.finish()?;
        }
        info!(
            pages,
            rendered = report.rendered.len(),
            skipped = report.skipped,
            unfit = report.warnings.len(),
            "overlay finished"
        );
        Ok(report)
    }

    fn render_region<C: Canvas>(
        &self,
        canvas: &mut C,
        region: &TranslatedRegion,
    ) -> Result<RegionState> {
        let text = region.target_text.trim();
        if text.is_empty() {
            return Ok(RegionState::Skipped);
        }
        canvas.erase(region.rect)?;
        let target = region.rect.pad_vertical(self.padding.top, self.padding.bottom);
        let fit = self.fitter.fit_and_render(canvas, target, text)?;
        Ok(match fit.font_size {
            Some(font_size) if fit.fitted => RegionState::Rendered(font_size),
            _ => RegionState::Unfit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::SizeRange;
    use crate::fit::tests::{Call, SpyCanvas};
    use crate::geometry::Rect;

    struct SpyDocument {
        pages: Vec<SpyCanvas>,
        opened: usize,
    }

    impl SpyDocument {
        fn new(pages: Vec<SpyCanvas>) -> Self {
            Self { pages, opened: 0 }
        }
    }

    impl PageSurface for SpyDocument {
        type Canvas<'a> = &'a mut SpyCanvas;

        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn canvas(&mut self, page: usize) -> Result<Self::Canvas<'_>> {
            self.opened += 1;
            self.pages
                .get_mut(page)
                .ok_or_else(|| anyhow::anyhow!("no page {page}"))
        }
    }

    fn translated(page: usize, name: &str, rect: [f32; 4], target: &str) -> TranslatedRegion {
        TranslatedRegion {
            page,
            region_name: name.to_string(),
            rect: Rect::from(rect),
            source_text: "source".to_string(),
            target_text: target.to_string(),
        }
    }

    #[test]
    fn erases_exact_rect_and_renders_into_padded_box() {
        let mut document = SpyDocument::new(vec![SpyCanvas::fitting(&[(10, 20.0)])]);
        let regions = vec![translated(0, "total", [100.0, 700.0, 300.0, 720.0], "२४५.०० रुपये")];
        let report = RegionCompositor::default()
            .apply(&mut document, &regions)
            .unwrap();

        let calls = &document.pages[0].calls;
        assert_eq!(calls[0], Call::Erase(Rect::new(100.0, 700.0, 300.0, 720.0)));
        // Padded box is [100, 698, 300, 734]; half the leftover goes above the text.
        assert_eq!(
            calls[1],
            Call::Commit {
                rect: Rect::new(100.0, 708.0, 300.0, 734.0),
                text: "२४५.०० रुपये".to_string(),
                font_size: 10.0,
            }
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(report.rendered.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn erase_never_exceeds_configured_rect() {
        let mut document = SpyDocument::new(vec![SpyCanvas::fitting(&[(8, 1.0)])]);
        let rect = Rect::new(10.0, 10.0, 50.0, 20.0);
        let regions = vec![translated(0, "field", [10.0, 10.0, 50.0, 20.0], "text")];
        RegionCompositor::default()
            .apply(&mut document, &regions)
            .unwrap();
        for call in &document.pages[0].calls {
            if let Call::Erase(erased) = call {
                assert!(erased.x0 >= rect.x0 && erased.x1 <= rect.x1);
                assert!(erased.y0 >= rect.y0 && erased.y1 <= rect.y1);
            }
        }
    }

    #[test]
    fn empty_target_is_skipped_without_warning() {
        let mut document = SpyDocument::new(vec![SpyCanvas::fitting(&[(10, 5.0)])]);
        let regions = vec![translated(0, "total", [100.0, 700.0, 300.0, 720.0], "  ")];
        let report = RegionCompositor::default()
            .apply(&mut document, &regions)
            .unwrap();
        assert!(document.pages[0].calls.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn unfit_text_leaves_region_blank_and_warns() {
        let mut document = SpyDocument::new(vec![SpyCanvas::default()]);
        let regions = vec![translated(0, "notes", [10.0, 10.0, 20.0, 12.0], "far too long")];
        let compositor = RegionCompositor::new(
            TextFitter::new(SizeRange::new(10.0, 6.0)),
            Padding::default(),
        );
        let report = compositor.apply(&mut document, &regions).unwrap();

        let calls = &document.pages[0].calls;
        assert_eq!(calls, &vec![Call::Erase(Rect::new(10.0, 10.0, 20.0, 12.0))]);
        assert_eq!(
            report.warnings,
            vec![UnfitRegion {
                page: 0,
                region_name: "notes".to_string(),
            }]
        );
        assert!(report.rendered.is_empty());
    }

    #[test]
    fn regions_only_touch_their_own_page() {
        let mut document = SpyDocument::new(vec![
            SpyCanvas::fitting(&[(10, 0.0)]),
            SpyCanvas::fitting(&[(10, 0.0)]),
        ]);
        let regions = vec![
            translated(0, "a", [0.0, 0.0, 100.0, 20.0], "first"),
            translated(1, "a", [0.0, 0.0, 100.0, 20.0], "second"),
            translated(5, "a", [0.0, 0.0, 100.0, 20.0], "nowhere"),
        ];
        let report = RegionCompositor::default()
            .apply(&mut document, &regions)
            .unwrap();
        assert_eq!(document.opened, 2);
        assert_eq!(document.pages[0].commits().len(), 1);
        assert_eq!(document.pages[1].commits().len(), 1);
        assert!(matches!(
            document.pages[1].commits()[0],
            Call::Commit { text, .. } if text == "second"
        ));
        assert_eq!(report.rendered.len(), 2);
    }

    #[test]
    fn report_shape() {
        let mut document = SpyDocument::new(vec![SpyCanvas::fitting(&[(9, 2.0)])]);
        let regions = vec![
            translated(0, "total", [100.0, 700.0, 300.0, 720.0], "कुल"),
            translated(0, "empty", [0.0, 0.0, 10.0, 10.0], ""),
        ];
        let report = RegionCompositor::default()
            .apply(&mut document, &regions)
            .unwrap();
        insta::assert_json_snapshot!(report, @r#"
        {
          "pages": 1,
          "rendered": [
            {
              "page": 0,
              "region_name": "total",
              "font_size": 9.0
            }
          ],
          "skipped": 1,
          "warnings": []
        }
        "#);
    }
}
