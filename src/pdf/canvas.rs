use anyhow::{Context, Result, anyhow, bail};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use super::{Overlay, PageBox, inherited_attribute};
use crate::fit::{Canvas, Measurement};
use crate::geometry::Rect;
use crate::layout::{COMMIT_TOLERANCE, TextBlock, TextMetrics, layout_text, layout_text_within};

const FONT_RESOURCE_PREFIX: &str = "RgnF";

/// Colours used when painting over a region and drawing its replacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub fill: [f32; 3],
    pub text: [f32; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill: [1.0, 1.0, 1.0],
            text: [0.0, 0.0, 0.0],
        }
    }
}

impl OverlayStyle {
    pub fn from_hex(fill: &str, text: &str) -> Result<Self> {
        Ok(Self {
            fill: parse_hex_color(fill)?,
            text: parse_hex_color(text)?,
        })
    }
}

/// Parses `#rrggbb` (the `#` is optional) into RGB components in `0..=1`.
pub fn parse_hex_color(value: &str) -> Result<[f32; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        bail!("invalid colour '{}': expected #rrggbb", value);
    }
    let mut rgb = [0.0; 3];
    for (index, component) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
            .with_context(|| format!("invalid colour '{}'", value))?;
        *component = f32::from(byte) / 255.0;
    }
    Ok(rgb)
}

/// Drawing surface for one page; operations are buffered until [`Canvas::finish`].
pub struct PdfCanvas<'a> {
    doc: &'a mut Document,
    overlay: &'a mut Overlay,
    page_id: ObjectId,
    page_box: PageBox,
    font_name: Vec<u8>,
    operations: Vec<Operation>,
    draws_text: bool,
}

impl<'a> PdfCanvas<'a> {
    pub(super) fn new(doc: &'a mut Document, overlay: &'a mut Overlay, page_id: ObjectId) -> Self {
        let page_box = PageBox::of_page(doc, page_id);
        let font_name = font_resource_name(doc, page_id, overlay.embedded.font_id());
        Self {
            doc,
            overlay,
            page_id,
            page_box,
            font_name,
            operations: Vec::new(),
            draws_text: false,
        }
    }
}

impl Canvas for PdfCanvas<'_> {
    fn erase(&mut self, rect: Rect) -> Result<()> {
        self.operations
            .extend(erase_operations(&self.page_box, &rect, self.overlay.style.fill));
        Ok(())
    }

    fn measure(&self, rect: Rect, text: &str, font_size: f32) -> Measurement {
        match layout_text(self.overlay.font.as_ref(), rect, text, font_size) {
            Ok(block) => Measurement::Fits {
                leftover: block.leftover,
            },
            Err(_) => Measurement::Overflow,
        }
    }

    fn commit(&mut self, rect: Rect, text: &str, font_size: f32) -> Result<()> {
        let block = layout_text_within(
            self.overlay.font.as_ref(),
            rect,
            text,
            font_size,
            COMMIT_TOLERANCE,
        )
        .map_err(|failure| anyhow!("text overflows its box by {:.1}pt", failure.overflow))?;
        let ascent = self.overlay.font.ascent(font_size);
        let lines: Vec<Vec<u8>> = block
            .lines
            .iter()
            .map(|line| self.overlay.embedded.encode(&line.text))
            .collect();
        self.operations.extend(text_operations(
            &self.page_box,
            &block,
            &lines,
            ascent,
            &self.font_name,
            self.overlay.style.text,
        ));
        self.draws_text = true;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        if self.operations.is_empty() {
            return Ok(());
        }
        if self.draws_text {
            register_font(
                self.doc,
                self.page_id,
                &self.font_name,
                self.overlay.embedded.font_id(),
            )?;
        }
        debug!(operations = self.operations.len(), "appending overlay to page");
        append_overlay(self.doc, self.page_id, self.operations)
    }
}

/// Opaque rectangle covering exactly `rect`.
pub(crate) fn erase_operations(page_box: &PageBox, rect: &Rect, fill: [f32; 3]) -> Vec<Operation> {
    let [x, y, width, height] = page_box.user_rect(rect);
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", fill.iter().map(|value| (*value).into()).collect()),
        Operation::new(
            "re",
            vec![x.into(), y.into(), width.into(), height.into()],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Draws each laid-out line centred horizontally in the block's rect.
pub(crate) fn text_operations(
    page_box: &PageBox,
    block: &TextBlock,
    encoded_lines: &[Vec<u8>],
    ascent: f32,
    font_name: &[u8],
    color: [f32; 3],
) -> Vec<Operation> {
    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("rg", color.iter().map(|value| (*value).into()).collect()),
        Operation::new(
            "Tf",
            vec![Object::Name(font_name.to_vec()), block.font_size.into()],
        ),
    ];
    for (index, (line, encoded)) in block.lines.iter().zip(encoded_lines).enumerate() {
        let x = block.rect.x0 + (block.rect.width() - line.width) / 2.0;
        let baseline = block.rect.y0 + index as f32 * block.line_height + ascent;
        let (x, y) = page_box.to_user(x, baseline);
        operations.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), x.into(), y.into()],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(encoded.clone(), StringFormat::Hexadecimal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));
    operations.push(Operation::new("Q", vec![]));
    operations
}

/// First free `RgnF<n>` name on the page, or the one already bound to `font_id`.
fn font_resource_name(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> Vec<u8> {
    let fonts = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|resources| match resources {
            Object::Dictionary(dict) => dict.get(b"Font").ok().cloned(),
            _ => None,
        })
        .and_then(|fonts| match fonts {
            Object::Reference(id) => doc.get_dictionary(id).ok().cloned(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        })
        .unwrap_or_default();
    (0u32..)
        .map(|index| format!("{FONT_RESOURCE_PREFIX}{index}").into_bytes())
        .find(|name| match fonts.get(name) {
            Ok(Object::Reference(id)) => *id == font_id,
            Ok(_) => false,
            Err(_) => true,
        })
        .unwrap_or_else(|| FONT_RESOURCE_PREFIX.as_bytes().to_vec())
}

/// The page's own resource dictionary, copying inherited resources down first.
fn page_resources_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    let own = doc
        .get_dictionary(page_id)
        .with_context(|| "page object is not a dictionary")?
        .get(b"Resources")
        .ok()
        .cloned();
    if let Some(Object::Reference(id)) = own {
        return doc
            .get_dictionary_mut(id)
            .with_context(|| "page resources are not a dictionary");
    }
    let resources = match own.or_else(|| inherited_attribute(doc, page_id, b"Resources")) {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };
    let page = doc
        .get_dictionary_mut(page_id)
        .with_context(|| "page object is not a dictionary")?;
    page.set("Resources", resources);
    page.get_mut(b"Resources")
        .and_then(Object::as_dict_mut)
        .with_context(|| "page resources are not a dictionary")
}

fn register_font(doc: &mut Document, page_id: ObjectId, name: &[u8], font_id: ObjectId) -> Result<()> {
    let fonts = page_resources_mut(doc, page_id)?.get(b"Font").ok().cloned();
    match fonts {
        Some(Object::Reference(id)) => {
            doc.get_dictionary_mut(id)
                .with_context(|| "font resources are not a dictionary")?
                .set(name.to_vec(), font_id);
        }
        Some(Object::Dictionary(mut dict)) => {
            dict.set(name.to_vec(), font_id);
            page_resources_mut(doc, page_id)?.set("Font", dict);
        }
        _ => {
            let mut dict = Dictionary::new();
            dict.set(name.to_vec(), font_id);
            page_resources_mut(doc, page_id)?.set("Font", dict);
        }
    }
    Ok(())
}

/// Appends `operations` after the page's existing content, which is wrapped
/// in `q`/`Q` so its graphics state cannot leak into the overlay.
pub(crate) fn append_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<()> {
    let existing: Vec<Object> = match doc
        .get_dictionary(page_id)
        .with_context(|| "page object is not a dictionary")?
        .get(b"Contents")
    {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    };
    let encoded = Content { operations }
        .encode()
        .with_context(|| "failed to encode overlay content")?;

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(save_id.into());
    contents.extend(existing);
    contents.push(restore_id.into());
    contents.push(overlay_id.into());
    doc.get_dictionary_mut(page_id)
        .with_context(|| "page object is not a dictionary")?
        .set("Contents", contents);
    Ok(())
}
