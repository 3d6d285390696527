use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compositor::Padding;
use crate::fit::{MAX_SIZE_STEPS, SizeRange};
use crate::pdf::OverlayStyle;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub font_path: Option<String>,
    pub font_size_max: f32,
    pub font_size_min: f32,
    pub pad_top: f32,
    pub pad_bottom: f32,
    pub text_color: String,
    pub fill_color: String,
    pub regions_path: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub concurrency: usize,
    pub protect_numbers: bool,
    pub server_addr: String,
    pub server_work_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size_max: 10.0,
            font_size_min: 6.0,
            pad_top: 2.0,
            pad_bottom: 14.0,
            text_color: "#000000".to_string(),
            fill_color: "#ffffff".to_string(),
            regions_path: None,
            source_lang: "en".to_string(),
            target_lang: "hi".to_string(),
            model: None,
            api_key: None,
            concurrency: 4,
            protect_numbers: true,
            server_addr: "127.0.0.1:5000".to_string(),
            server_work_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    overlay: Option<OverlaySettings>,
    regions: Option<RegionSettings>,
    translate: Option<TranslateSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_path: Option<String>,
    font_size_max: Option<f32>,
    font_size_min: Option<f32>,
    pad_top: Option<f32>,
    pad_bottom: Option<f32>,
    text_color: Option<String>,
    fill_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegionSettings {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    source_lang: Option<String>,
    target_lang: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    concurrency: Option<usize>,
    protect_numbers: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    work_dir: Option<String>,
}

/// Defaults, then the working directory, then the per-user directory, then an
/// explicit file. Later layers win field by field.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;
    let mut settings = Settings::default();
    for layer in settings_layers(home_dir().as_deref(), extra_path)? {
        if !layer.exists() {
            continue;
        }
        let content = fs::read_to_string(&layer)
            .with_context(|| format!("failed to read settings: {}", layer.display()))?;
        settings
            .merge_toml(&content)
            .with_context(|| format!("failed to parse settings: {}", layer.display()))?;
    }
    settings.validate()?;
    Ok(settings)
}

fn settings_layers(home: Option<&Path>, extra_path: Option<&Path>) -> Result<Vec<PathBuf>> {
    let file_names = ["settings.toml", "settings.local.toml"];
    let mut layers: Vec<PathBuf> = file_names.iter().map(PathBuf::from).collect();
    if let Some(home) = home {
        layers.extend(file_names.iter().map(|name| home.join(name)));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        layers.push(extra.to_path_buf());
    }
    Ok(layers)
}

impl Settings {
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(overlay) = incoming.overlay {
            if let Some(path) = non_empty(overlay.font_path) {
                self.font_path = Some(path);
            }
            if let Some(size) = overlay.font_size_max.filter(|size| *size > 0.0) {
                self.font_size_max = size;
            }
            if let Some(size) = overlay.font_size_min.filter(|size| *size > 0.0) {
                self.font_size_min = size;
            }
            if let Some(pad) = overlay.pad_top.filter(|pad| *pad >= 0.0) {
                self.pad_top = pad;
            }
            if let Some(pad) = overlay.pad_bottom.filter(|pad| *pad >= 0.0) {
                self.pad_bottom = pad;
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.text_color = color;
            }
            if let Some(color) = non_empty(overlay.fill_color) {
                self.fill_color = color;
            }
        }
        if let Some(regions) = incoming.regions {
            if let Some(path) = non_empty(regions.path) {
                self.regions_path = Some(path);
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(lang) = non_empty(translate.source_lang) {
                self.source_lang = lang;
            }
            if let Some(lang) = non_empty(translate.target_lang) {
                self.target_lang = lang;
            }
            if let Some(model) = non_empty(translate.model) {
                self.model = Some(model);
            }
            if let Some(key) = non_empty(translate.api_key) {
                self.api_key = Some(key);
            }
            if let Some(limit) = translate.concurrency {
                if limit > 0 {
                    self.concurrency = limit;
                }
            }
            if let Some(protect) = translate.protect_numbers {
                self.protect_numbers = protect;
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
            if let Some(dir) = non_empty(server.work_dir) {
                self.server_work_dir = Some(dir);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.font_size_max.is_finite() || !self.font_size_min.is_finite() {
            return Err(anyhow!(
                "font sizes must be finite (max {}, min {})",
                self.font_size_max,
                self.font_size_min
            ));
        }
        if self.font_size_max - self.font_size_min >= MAX_SIZE_STEPS as f32 {
            return Err(anyhow!(
                "font size range {}..{} spans more than {} steps",
                self.font_size_min,
                self.font_size_max,
                MAX_SIZE_STEPS
            ));
        }
        if self.font_size_min > self.font_size_max {
            return Err(anyhow!(
                "font_size_min ({}) is larger than font_size_max ({})",
                self.font_size_min,
                self.font_size_max
            ));
        }
        self.style()?;
        Ok(())
    }

    pub fn size_range(&self) -> SizeRange {
        SizeRange::new(self.font_size_max, self.font_size_min)
    }

    pub fn padding(&self) -> Padding {
        Padding {
            top: self.pad_top,
            bottom: self.pad_bottom,
        }
    }

    pub fn style(&self) -> Result<OverlayStyle> {
        OverlayStyle::from_hex(&self.fill_color, &self.text_color)
    }

    /// API key from settings, falling back to `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".pdf-region-translator"))
        }
    })
}
