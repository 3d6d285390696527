use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ttf_parser::{Face, GlyphId, name_id};

use crate::error::OverlayError;
use crate::layout::TextMetrics;

/// The single typeface used for every overlay, parsed once at startup.
#[derive(Clone)]
pub struct OverlayFont {
    data: Arc<Vec<u8>>,
    /// Glyph id and advance for every character the Unicode cmap covers.
    glyph_map: Arc<HashMap<char, (u16, u16)>>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    line_gap: i16,
    space_advance: u16,
    bbox: [i16; 4],
    family: Option<String>,
}

impl std::fmt::Debug for OverlayFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFont")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .finish_non_exhaustive()
    }
}

impl OverlayFont {
    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        if !path.is_file() {
            return Err(OverlayError::FontMissing(path.to_path_buf()));
        }
        let data = std::fs::read(path).map_err(|err| OverlayError::FontInvalid {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_data(data).map_err(|message| OverlayError::FontInvalid {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_data(data: Vec<u8>) -> Result<Self, String> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        for index in 0..count {
            let Ok(face) = Face::parse(&data, index) else {
                continue;
            };
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let global = face.global_bounding_box();
            let bbox = [global.x_min, global.y_min, global.x_max, global.y_max];
            let ascender = face.ascender();
            let descender = face.descender();
            let line_gap = face.line_gap();
            let family = extract_family_name(&face);
            let glyph_map = build_glyph_map(&face, space_advance);
            return Ok(Self {
                data: Arc::new(data),
                glyph_map: Arc::new(glyph_map),
                units_per_em,
                ascender,
                descender,
                line_gap,
                space_advance,
                bbox,
                family,
            });
        }
        Err("no usable face in font data".to_string())
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    /// Name usable as a PDF BaseFont: printable ASCII without spaces.
    pub fn postscript_name(&self) -> String {
        let name: String = self
            .family
            .as_deref()
            .unwrap_or("OverlayFont")
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
            .collect();
        if name.is_empty() {
            "OverlayFont".to_string()
        } else {
            name
        }
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn ascender(&self) -> i16 {
        self.ascender
    }

    pub fn descender(&self) -> i16 {
        self.descender
    }

    pub fn bbox(&self) -> [i16; 4] {
        self.bbox
    }

    /// Glyph id and advance (font units) for each character.
    /// Characters the face does not cover map to `.notdef` with a space advance.
    pub fn glyphs(&self, text: &str) -> Vec<(char, u16, u16)> {
        text.chars()
            .map(|ch| match self.glyph_map.get(&ch) {
                Some(&(id, advance)) => (ch, id, advance),
                None => (ch, 0, self.space_advance),
            })
            .collect()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / f32::from(self.units_per_em)
    }
}

impl TextMetrics for OverlayFont {
    fn advance(&self, text: &str, font_size: f32) -> f32 {
        let units: u32 = self
            .glyphs(text)
            .iter()
            .map(|(_, _, advance)| u32::from(*advance))
            .sum();
        units as f32 * self.scale(font_size)
    }

    fn ascent(&self, font_size: f32) -> f32 {
        f32::from(self.ascender) * self.scale(font_size)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        let units = i32::from(self.ascender) - i32::from(self.descender) + i32::from(self.line_gap);
        (units.max(1) as f32) * self.scale(font_size)
    }
}

/// Walks the Unicode cmap subtables once; earlier subtables win, as in
/// `Face::glyph_index`.
fn build_glyph_map(face: &Face<'_>, space_advance: u16) -> HashMap<char, (u16, u16)> {
    let mut glyphs = HashMap::new();
    let Some(cmap) = face.tables().cmap else {
        return glyphs;
    };
    for subtable in cmap.subtables {
        if !subtable.is_unicode() {
            continue;
        }
        subtable.codepoints(|code_point| {
            let Some(ch) = char::from_u32(code_point) else {
                return;
            };
            if glyphs.contains_key(&ch) {
                return;
            }
            if let Some(GlyphId(id)) = subtable.glyph_index(code_point).filter(|id| id.0 != 0) {
                let advance = face.glyph_hor_advance(GlyphId(id)).unwrap_or(space_advance);
                glyphs.insert(ch, (id, advance));
            }
        });
    }
    glyphs
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
