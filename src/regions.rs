use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OverlayError;
use crate::geometry::Rect;

/// A named field location, reapplied unchanged to every page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSpec {
    pub name: String,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionTemplate {
    regions: Vec<RegionSpec>,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(alias = "all_pages")]
    regions: Vec<RegionEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    name: String,
    rect: Vec<f32>,
    page: Option<i64>,
}

impl RegionTemplate {
    pub fn new(regions: Vec<RegionSpec>) -> Result<Self, OverlayError> {
        if regions.is_empty() {
            return Err(OverlayError::region_config("no regions defined"));
        }
        let mut names = HashSet::new();
        for region in &regions {
            if region.name.trim().is_empty() {
                return Err(OverlayError::region_config("region name is empty"));
            }
            if !names.insert(region.name.as_str()) {
                return Err(OverlayError::region_config(format!(
                    "duplicate region name '{}'",
                    region.name
                )));
            }
            let Rect { x0, y0, x1, y1 } = region.rect;
            if ![x0, y0, x1, y1].iter().all(|value| value.is_finite()) {
                return Err(OverlayError::region_config(format!(
                    "region '{}' has a non-finite coordinate",
                    region.name
                )));
            }
            if x0 > x1 || y0 > y1 {
                return Err(OverlayError::region_config(format!(
                    "region '{}' has inverted corners [{x0}, {y0}, {x1}, {y1}]",
                    region.name
                )));
            }
        }
        Ok(Self { regions })
    }

    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let content = fs::read_to_string(path).map_err(|err| {
            OverlayError::region_config(format!("failed to read {}: {}", path.display(), err))
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, OverlayError> {
        let file: TemplateFile = toml::from_str(content)
            .map_err(|err| OverlayError::region_config(format!("failed to parse TOML: {err}")))?;
        Self::from_entries(file.regions)
    }

    pub fn from_json(content: &str) -> Result<Self, OverlayError> {
        let file: TemplateFile = serde_json::from_str(content)
            .map_err(|err| OverlayError::region_config(format!("failed to parse JSON: {err}")))?;
        Self::from_entries(file.regions)
    }

    fn from_entries(entries: Vec<RegionEntry>) -> Result<Self, OverlayError> {
        let mut regions = Vec::with_capacity(entries.len());
        for entry in entries {
            let rect: [f32; 4] = entry.rect.as_slice().try_into().map_err(|_| {
                OverlayError::region_config(format!(
                    "region '{}' must have exactly four coordinates, got {}",
                    entry.name,
                    entry.rect.len()
                ))
            })?;
            if let Some(page) = entry.page {
                debug!(region = %entry.name, page, "ignoring page hint; regions apply to every page");
            }
            regions.push(RegionSpec {
                name: entry.name,
                rect: Rect::from(rect),
            });
        }
        Self::new(regions)
    }

    pub fn regions(&self) -> &[RegionSpec] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_template() {
        let template = RegionTemplate::from_toml(
            r#"
            [[regions]]
            name = "total"
            rect = [100, 700, 300, 720]

            [[regions]]
            name = "customer"
            rect = [40.5, 120, 260, 140]
            page = 0
            "#,
        )
        .unwrap();
        assert_eq!(template.len(), 2);
        assert_eq!(template.regions()[0].name, "total");
        assert_eq!(template.regions()[0].rect, Rect::new(100.0, 700.0, 300.0, 720.0));
        assert_eq!(template.regions()[1].rect.x0, 40.5);
    }

    #[test]
    fn accepts_all_pages_key_in_json() {
        let template = RegionTemplate::from_json(
            r#"{"all_pages": [{"name": "total", "rect": [100, 700, 300, 720]}]}"#,
        )
        .unwrap();
        assert_eq!(template.regions()[0].name, "total");
    }

    #[test]
    fn loads_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.json");
        fs::write(&path, r#"{"regions": [{"name": "a", "rect": [0, 0, 1, 1]}]}"#).unwrap();
        assert_eq!(RegionTemplate::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn rejects_malformed_entries() {
        let cases = [
            r#"{"regions": []}"#,
            r#"{"regions": [{"name": "a", "rect": [0, 0, 1]}]}"#,
            r#"{"regions": [{"name": "a", "rect": [0, 0, 1, 1, 2]}]}"#,
            r#"{"regions": [{"name": "", "rect": [0, 0, 1, 1]}]}"#,
            r#"{"regions": [{"name": "a", "rect": [5, 0, 1, 1]}]}"#,
            r#"{"regions": [{"name": "a", "rect": [0, 0, 1, 1]}, {"name": "a", "rect": [0, 0, 2, 2]}]}"#,
            r#"{"regions": [{"rect": [0, 0, 1, 1]}]}"#,
            r#"{"fields": []}"#,
        ];
        for case in cases {
            let err = RegionTemplate::from_json(case).unwrap_err();
            assert!(matches!(err, OverlayError::RegionConfig(_)), "{case}: {err}");
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = RegionTemplate::load(Path::new("/nonexistent/regions.toml")).unwrap_err();
        assert!(matches!(err, OverlayError::RegionConfig(_)));
    }
}
