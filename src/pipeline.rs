use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::compositor::{RegionCompositor, RenderReport};
use crate::error::OverlayError;
use crate::extract::{ExtractedRegion, extract};
use crate::fit::TextFitter;
use crate::font::OverlayFont;
use crate::pdf::{DocumentInfo, OverlayStyle, PdfDocument};
use crate::regions::RegionTemplate;
use crate::settings::Settings;
use crate::translate::{TextTranslator, TranslatedRegion, translate_regions};

const DEFAULT_CONCURRENCY: usize = 4;

/// End-to-end run over one document: extract, translate, overlay, save.
///
/// Holds no per-document state, so one instance can serve any number of runs.
#[derive(Clone)]
pub struct RegionTranslator {
    template: RegionTemplate,
    font: Arc<OverlayFont>,
    compositor: RegionCompositor,
    style: OverlayStyle,
    translator: Arc<dyn TextTranslator>,
    concurrency: usize,
}

impl RegionTranslator {
    pub fn new(
        template: RegionTemplate,
        font: Arc<OverlayFont>,
        translator: Arc<dyn TextTranslator>,
    ) -> Self {
        Self {
            template,
            font,
            compositor: RegionCompositor::default(),
            style: OverlayStyle::default(),
            translator,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        template: RegionTemplate,
        font: Arc<OverlayFont>,
        translator: Arc<dyn TextTranslator>,
    ) -> Result<Self> {
        let compositor =
            RegionCompositor::new(TextFitter::new(settings.size_range()), settings.padding());
        Ok(Self::new(template, font, translator)
            .with_compositor(compositor)
            .with_style(settings.style()?)
            .with_concurrency(settings.concurrency))
    }

    pub fn with_compositor(mut self, compositor: RegionCompositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn template(&self) -> &RegionTemplate {
        &self.template
    }

    pub fn info(&self, path: &Path) -> Result<DocumentInfo> {
        Ok(PdfDocument::open(path)?.info())
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<ExtractedRegion>> {
        let document = open_readable(path)?;
        extract(&document, self.template.regions())
    }

    pub async fn translate(&self, path: &Path) -> Result<Vec<TranslatedRegion>> {
        let extracted = self.extract(path)?;
        Ok(translate_regions(extracted, self.translator.as_ref(), self.concurrency).await?)
    }

    /// Writes a copy of `input` with every region overlaid to `output`.
    pub async fn render(&self, input: &Path, output: &Path) -> Result<RenderReport> {
        let mut document = open_readable(input)?;
        let extracted = extract(&document, self.template.regions())?;
        let translated =
            translate_regions(extracted, self.translator.as_ref(), self.concurrency).await?;

        document.attach_overlay(Arc::clone(&self.font), self.style);
        let report = self
            .compositor
            .apply(&mut document, &translated)
            .with_context(|| format!("failed to overlay {}", input.display()))?;
        document.save(output)?;
        info!(
            input = %input.display(),
            output = %output.display(),
            rendered = report.rendered.len(),
            unfit = report.warnings.len(),
            "translated document"
        );
        Ok(report)
    }
}

fn open_readable(path: &Path) -> Result<PdfDocument, OverlayError> {
    let document = PdfDocument::open(path)?;
    if document.is_encrypted() {
        return Err(OverlayError::Encrypted(path.to_path_buf()));
    }
    Ok(document)
}
