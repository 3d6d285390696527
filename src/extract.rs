use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{PageTextIndex, TextSource};
use crate::geometry::Rect;
use crate::regions::RegionSpec;

/// Text found inside one region on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRegion {
    pub page: usize,
    pub region_name: String,
    pub rect: Rect,
    pub text: String,
}

/// Applies every region to every page.
///
/// Output is grouped by page, then by region in template order, with one entry
/// per pair even when nothing was found.
pub fn extract<S: TextSource + ?Sized>(
    source: &S,
    regions: &[RegionSpec],
) -> Result<Vec<ExtractedRegion>> {
    let page_count = source.page_count();
    let mut extracted = Vec::with_capacity(page_count * regions.len());
    for page in 0..page_count {
        let index = PageTextIndex::new(source, page);
        for region in regions {
            let text = collect_text(&index, &region.rect)?;
            debug!(page, region = %region.name, chars = text.len(), "extracted region");
            extracted.push(ExtractedRegion {
                page,
                region_name: region.name.clone(),
                rect: region.rect,
                text,
            });
        }
    }
    Ok(extracted)
}

fn collect_text<S: TextSource + ?Sized>(index: &PageTextIndex<'_, S>, rect: &Rect) -> Result<String> {
    let collected: Vec<&str> = index
        .intersecting(rect)?
        .map(|fragment| fragment.text.trim())
        .filter(|text| !text.is_empty())
        .collect();
    Ok(collected.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextFragment;
    use crate::document::tests::MemoryText;

    fn region(name: &str, rect: [f32; 4]) -> RegionSpec {
        RegionSpec {
            name: name.to_string(),
            rect: Rect::from(rect),
        }
    }

    fn fragment(bbox: [f32; 4], text: &str) -> TextFragment {
        TextFragment::new(Rect::from(bbox), text)
    }

    #[test]
    fn fragment_inside_region_is_extracted() {
        let source = MemoryText::new(vec![vec![fragment([100.0, 705.0, 200.0, 715.0], "245.00")]]);
        let regions = vec![region("total", [100.0, 700.0, 300.0, 720.0])];
        let extracted = extract(&source, &regions).unwrap();
        assert_eq!(
            extracted,
            vec![ExtractedRegion {
                page: 0,
                region_name: "total".to_string(),
                rect: Rect::new(100.0, 700.0, 300.0, 720.0),
                text: "245.00".to_string(),
            }]
        );
    }

    #[test]
    fn one_entry_per_page_and_region() {
        let page = vec![fragment([0.0, 0.0, 10.0, 10.0], "x")];
        let source = MemoryText::new(vec![page.clone(), page.clone(), page]);
        let regions = vec![
            region("a", [0.0, 0.0, 5.0, 5.0]),
            region("b", [50.0, 50.0, 60.0, 60.0]),
        ];
        let extracted = extract(&source, &regions).unwrap();
        assert_eq!(extracted.len(), 3 * 2);
        let order: Vec<(usize, &str)> = extracted
            .iter()
            .map(|item| (item.page, item.region_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(0, "a"), (0, "b"), (1, "a"), (1, "b"), (2, "a"), (2, "b")]
        );
        assert_eq!(extracted[0].text, "x");
        assert_eq!(extracted[1].text, "");
    }

    #[test]
    fn region_without_fragments_yields_empty_text() {
        let source = MemoryText::new(vec![vec![fragment([0.0, 0.0, 10.0, 10.0], "far away")]]);
        let regions = vec![region("total", [100.0, 700.0, 300.0, 720.0])];
        let extracted = extract(&source, &regions).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].text, "");
    }

    #[test]
    fn fragments_are_trimmed_and_joined_in_read_order() {
        let source = MemoryText::new(vec![vec![
            fragment([10.0, 20.0, 40.0, 30.0], "  Amount "),
            fragment([10.0, 0.0, 40.0, 10.0], "   "),
            fragment([45.0, 20.0, 90.0, 30.0], "due\n"),
            // Touches the region's right edge only.
            fragment([100.0, 20.0, 150.0, 30.0], "edge"),
            fragment([101.0, 20.0, 150.0, 30.0], "outside"),
        ]]);
        let regions = vec![region("label", [0.0, 0.0, 100.0, 40.0])];
        let extracted = extract(&source, &regions).unwrap();
        assert_eq!(extracted[0].text, "Amount due edge");
    }

    #[test]
    fn extraction_is_idempotent() {
        let source = MemoryText::new(vec![
            vec![fragment([0.0, 0.0, 10.0, 10.0], "one")],
            vec![fragment([0.0, 0.0, 10.0, 10.0], "two")],
        ]);
        let regions = vec![region("field", [0.0, 0.0, 20.0, 20.0])];
        let first = extract(&source, &regions).unwrap();
        let second = extract(&source, &regions).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn page_failures_abort_extraction() {
        struct Broken;
        impl TextSource for Broken {
            fn page_count(&self) -> usize {
                1
            }
            fn text_fragments(&self, page: usize) -> Result<Vec<TextFragment>> {
                Err(crate::error::OverlayError::corrupt_page(page, "bad stream").into())
            }
        }
        let regions = vec![region("field", [0.0, 0.0, 20.0, 20.0])];
        assert!(extract(&Broken, &regions).is_err());
    }
}
