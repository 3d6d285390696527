//! Embeds the overlay typeface as a composite (Type0 / Identity-H) font.
//!
//! Glyph ids are written directly as two-byte codes, so shaping stays with
//! the font's cmap and the ToUnicode map keeps the output searchable.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::font::OverlayFont;

const CMAP_CHUNK: usize = 100;

pub(crate) struct EmbeddedFont {
    font: Arc<OverlayFont>,
    font_id: ObjectId,
    /// Glyph id to the first character drawn with it and its advance.
    used: BTreeMap<u16, (char, u16)>,
}

impl EmbeddedFont {
    /// Reserves the font's object id; the objects themselves are written by
    /// [`EmbeddedFont::write`] once every page has been drawn.
    pub(crate) fn reserve(doc: &mut Document, font: Arc<OverlayFont>) -> Self {
        Self {
            font,
            font_id: doc.new_object_id(),
            used: BTreeMap::new(),
        }
    }

    pub(crate) fn font_id(&self) -> ObjectId {
        self.font_id
    }

    /// Two-byte glyph codes for `text`, recording each glyph for the width
    /// and ToUnicode tables.
    pub(crate) fn encode(&mut self, text: &str) -> Vec<u8> {
        let glyphs = self.font.glyphs(text);
        let mut bytes = Vec::with_capacity(glyphs.len() * 2);
        for (ch, gid, advance) in glyphs {
            self.used.entry(gid).or_insert((ch, advance));
            bytes.extend_from_slice(&gid.to_be_bytes());
        }
        bytes
    }

    pub(crate) fn write(&self, doc: &mut Document) -> Result<()> {
        let font = self.font.as_ref();
        let scale = 1000.0 / f32::from(font.units_per_em());
        let to_pdf = |units: i16| (f32::from(units) * scale).round() as i64;
        let base_font = font.postscript_name();

        let data = font.data().to_vec();
        let length = data.len() as i64;
        let mut file = Stream::new(dictionary! { "Length1" => length }, data);
        file.compress()
            .with_context(|| "failed to compress embedded font")?;
        let file_id = doc.add_object(file);

        let [x_min, y_min, x_max, y_max] = font.bbox();
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(base_font.clone().into_bytes()),
            "Flags" => 32,
            "FontBBox" => vec![
                to_pdf(x_min).into(),
                to_pdf(y_min).into(),
                to_pdf(x_max).into(),
                to_pdf(y_max).into(),
            ],
            "ItalicAngle" => 0,
            "Ascent" => to_pdf(font.ascender()),
            "Descent" => to_pdf(font.descender()),
            "CapHeight" => to_pdf(font.ascender()),
            "StemV" => 80,
            "FontFile2" => file_id,
        });

        let widths: Vec<Object> = self
            .used
            .iter()
            .flat_map(|(gid, (_, advance))| {
                let width = (f32::from(*advance) * scale).round() as i64;
                [
                    Object::Integer(i64::from(*gid)),
                    Object::Array(vec![Object::Integer(width)]),
                ]
            })
            .collect();
        let descendant_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(base_font.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id =
            doc.add_object(Stream::new(Dictionary::new(), self.to_unicode().into_bytes()));

        doc.objects.insert(
            self.font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => Object::Name(base_font.into_bytes()),
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![descendant_id.into()],
                "ToUnicode" => to_unicode_id,
            }),
        );
        Ok(())
    }

    fn to_unicode(&self) -> String {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n\
             <0000> <FFFF>\n\
             endcodespacerange\n",
        );
        let entries: Vec<(u16, char)> = self
            .used
            .iter()
            .filter(|(gid, _)| **gid != 0)
            .map(|(gid, (ch, _))| (*gid, *ch))
            .collect();
        for chunk in entries.chunks(CMAP_CHUNK) {
            let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
            for (gid, ch) in chunk {
                let mut units = [0u16; 2];
                let hex: String = ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|unit| format!("{unit:04X}"))
                    .collect();
                let _ = writeln!(cmap, "<{gid:04X}> <{hex}>");
            }
            cmap.push_str("endbfchar\n");
        }
        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap
    }
}
