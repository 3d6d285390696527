use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;

pub mod compositor;
pub mod document;
pub mod error;
pub mod extract;
pub mod fit;
pub mod font;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod pdf;
pub mod pipeline;
pub mod regions;
pub mod server;
pub mod settings;
pub mod translate;

pub use compositor::{Padding, RegionCompositor, RenderReport};
pub use error::OverlayError;
pub use extract::{ExtractedRegion, extract};
pub use fit::{FitResult, SizeRange, TextFitter};
pub use font::OverlayFont;
pub use geometry::Rect;
pub use pdf::{DocumentInfo, OverlayStyle, PdfDocument};
pub use pipeline::RegionTranslator;
pub use regions::{RegionSpec, RegionTemplate};
pub use translate::{
    NumberGuard, OpenAiTranslator, TextTranslator, TranslateFuture, TranslatedRegion,
    translate_regions,
};

/// Command-line overrides layered on top of the settings files.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings_path: Option<String>,
    pub regions_path: Option<String>,
    pub font_path: Option<String>,
    pub key: Option<String>,
    pub model: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
}

impl Config {
    fn apply(&self, settings: &mut settings::Settings) {
        let overrides = [
            (&self.regions_path, &mut settings.regions_path),
            (&self.font_path, &mut settings.font_path),
            (&self.key, &mut settings.api_key),
            (&self.model, &mut settings.model),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value.as_ref().filter(|value| !value.trim().is_empty()) {
                *slot = Some(value.clone());
            }
        }
        if let Some(lang) = self.source_lang.as_ref().filter(|lang| !lang.trim().is_empty()) {
            settings.source_lang = lang.clone();
        }
        if let Some(lang) = self.target_lang.as_ref().filter(|lang| !lang.trim().is_empty()) {
            settings.target_lang = lang.clone();
        }
    }
}

pub struct Runtime {
    pub settings: settings::Settings,
    pub pipeline: RegionTranslator,
}

/// Loads settings and every startup resource. A missing font or a broken
/// region template fails here, before any document is opened.
pub fn prepare(config: &Config) -> Result<Runtime> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    config.apply(&mut settings);

    let regions_path = settings.regions_path.as_deref().ok_or_else(|| {
        OverlayError::region_config("no region template configured (--regions or [regions] path)")
    })?;
    let template = RegionTemplate::load(Path::new(regions_path))?;

    let font_path = settings
        .font_path
        .as_deref()
        .ok_or_else(|| anyhow!("no overlay font configured (--font or [overlay] font_path)"))?;
    let font = Arc::new(OverlayFont::load(Path::new(font_path))?);

    let translator = build_translator(&settings);
    let pipeline = RegionTranslator::from_settings(&settings, template, font, translator)
        .with_context(|| "invalid overlay settings")?;
    Ok(Runtime { settings, pipeline })
}

fn build_translator(settings: &settings::Settings) -> Arc<dyn TextTranslator> {
    let mut openai = OpenAiTranslator::new(
        settings.resolve_api_key().unwrap_or_default(),
        &settings.source_lang,
        &settings.target_lang,
    );
    if let Some(model) = settings.model.as_deref() {
        openai = openai.with_model(model);
    }
    if settings.protect_numbers {
        Arc::new(NumberGuard::new(openai))
    } else {
        Arc::new(openai)
    }
}
