//! Content-stream interpreter that recovers positioned text runs.
//!
//! Only the text and graphics-state operators that move glyphs are tracked.
//! Form XObjects and Type3 glyph procedures are not entered.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::{PageBox, number, resolve};
use crate::document::TextFragment;
use crate::geometry::Rect;

/// Glyph box in text space, as fractions of the font size.
const ASCENT_EM: f32 = 0.8;
const DESCENT_EM: f32 = -0.2;
/// Width used for codes the font does not describe, in thousandths of an em.
const FALLBACK_WIDTH: f32 = 500.0;
/// `TJ` gaps wider than this many thousandths of an em read as a word break.
const SPACE_ADJUSTMENT: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values: Vec<f32> = operands.iter().map(number).collect::<Option<_>>()?;
        match values.as_slice() {
            [a, b, c, d, e, f] => Some(Matrix {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            _ => None,
        }
    }

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }
}

/// Advance widths of one font resource, in thousandths of an em.
#[derive(Debug, Clone, PartialEq)]
struct FontWidths {
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: BTreeMap<u32, f32>,
    default_width: f32,
}

impl FontWidths {
    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let is_type0 = matches!(font.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Type0");
        if is_type0 {
            return Self::composite(doc, font);
        }
        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|value| number(resolve(doc, value)))
            .unwrap_or(0.0) as u32;
        let widths = match font.get(b"Widths").map(|value| resolve(doc, value)) {
            Ok(Object::Array(items)) => items
                .iter()
                .map(|item| number(resolve(doc, item)).unwrap_or(FALLBACK_WIDTH))
                .collect(),
            _ => Vec::new(),
        };
        let default_width = descriptor_missing_width(doc, font).unwrap_or(FALLBACK_WIDTH);
        Self {
            two_byte: false,
            first_char,
            widths,
            cid_widths: BTreeMap::new(),
            default_width,
        }
    }

    fn composite(doc: &Document, font: &Dictionary) -> Self {
        let descendant = match font.get(b"DescendantFonts").map(|value| resolve(doc, value)) {
            Ok(Object::Array(items)) => items.first().map(|item| resolve(doc, item)),
            _ => None,
        };
        let descendant = descendant.and_then(|object| object.as_dict().ok());
        let default_width = descendant
            .and_then(|dict| dict.get(b"DW").ok())
            .and_then(|value| number(resolve(doc, value)))
            .unwrap_or(1000.0);
        let cid_widths = match descendant.and_then(|dict| dict.get(b"W").ok()) {
            Some(value) => match resolve(doc, value) {
                Object::Array(items) => parse_cid_widths(doc, items),
                _ => BTreeMap::new(),
            },
            None => BTreeMap::new(),
        };
        Self {
            two_byte: true,
            first_char: 0,
            widths: Vec::new(),
            cid_widths,
            default_width,
        }
    }

    fn fallback() -> Self {
        Self {
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: BTreeMap::new(),
            default_width: FALLBACK_WIDTH,
        }
    }

    /// Splits a shown string into character codes with their widths.
    fn codes(&self, bytes: &[u8]) -> Vec<(u32, f32)> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| {
                    let code = pair
                        .iter()
                        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
                    let width = self
                        .cid_widths
                        .get(&code)
                        .copied()
                        .unwrap_or(self.default_width);
                    (code, width)
                })
                .collect()
        } else {
            bytes
                .iter()
                .map(|byte| {
                    let code = u32::from(*byte);
                    let width = code
                        .checked_sub(self.first_char)
                        .and_then(|index| self.widths.get(index as usize))
                        .copied()
                        .unwrap_or(self.default_width);
                    (code, width)
                })
                .collect()
        }
    }
}

fn descriptor_missing_width(doc: &Document, font: &Dictionary) -> Option<f32> {
    let descriptor = resolve(doc, font.get(b"FontDescriptor").ok()?).as_dict().ok()?;
    number(resolve(doc, descriptor.get(b"MissingWidth").ok()?))
}

/// Largest code a two-byte `Identity-H` string can carry.
const MAX_CID: u32 = 0xFFFF;

/// `/W` entries are either `c [w1 w2 ...]` or `c_first c_last w`.
/// Entries naming codes outside `0..=MAX_CID` are skipped.
fn parse_cid_widths(doc: &Document, items: &[Object]) -> BTreeMap<u32, f32> {
    let mut widths = BTreeMap::new();
    let mut index = 0;
    while index < items.len() {
        let Some(first) = number(resolve(doc, &items[index])) else {
            break;
        };
        let first = cid(first);
        match items.get(index + 1).map(|item| resolve(doc, item)) {
            Some(Object::Array(list)) => {
                if let Some(first) = first {
                    for (offset, width) in list.iter().enumerate() {
                        let Some(code) = u32::try_from(offset)
                            .ok()
                            .and_then(|offset| first.checked_add(offset))
                            .filter(|code| *code <= MAX_CID)
                        else {
                            break;
                        };
                        if let Some(width) = number(resolve(doc, width)) {
                            widths.insert(code, width);
                        }
                    }
                }
                index += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (
                    number(last),
                    items.get(index + 2).and_then(|item| number(resolve(doc, item))),
                ) else {
                    break;
                };
                if let (Some(first), Some(last)) = (first, cid(last)) {
                    for code in first..=last {
                        widths.insert(code, width);
                    }
                }
                index += 3;
            }
            None => break,
        }
    }
    widths
}

fn cid(value: f32) -> Option<u32> {
    (0.0..=MAX_CID as f32)
        .contains(&value)
        .then(|| value as u32)
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// One element of a `TJ` array, or the single operand of `Tj`.
enum ShowItem<'a> {
    Text(&'a [u8]),
    Adjust(f32),
}

struct Interpreter<'d, D> {
    page_box: &'d PageBox,
    fonts: BTreeMap<Vec<u8>, FontWidths>,
    fallback: FontWidths,
    decode: D,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    fragments: Vec<TextFragment>,
}

impl<'d, D> Interpreter<'d, D>
where
    D: Fn(Option<&[u8]>, &[u8]) -> String,
{
    fn run(&mut self, operations: &[Operation]) {
        for operation in operations {
            self.step(operation);
        }
    }

    fn step(&mut self, operation: &Operation) {
        let operands = operation.operands.as_slice();
        match operation.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.state.ctm = matrix.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let [Object::Name(name), size] = operands {
                    self.state.font = Some(name.clone());
                    self.state.font_size = number(size).unwrap_or(0.0);
                }
            }
            "Tc" => set_from(operands, &mut self.state.char_spacing),
            "Tw" => set_from(operands, &mut self.state.word_spacing),
            "TL" => set_from(operands, &mut self.state.leading),
            "Ts" => set_from(operands, &mut self.state.rise),
            "Tz" => {
                if let Some(scale) = operands.first().and_then(number) {
                    self.state.horizontal_scale = scale / 100.0;
                }
            }
            "Td" => {
                if let Some((tx, ty)) = pair(operands) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some((tx, ty)) = pair(operands) {
                    self.state.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(&[ShowItem::Text(bytes)]);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(&[ShowItem::Text(bytes)]);
                }
            }
            "\"" => {
                if let [word, character, Object::String(bytes, _)] = operands {
                    self.state.word_spacing = number(word).unwrap_or(0.0);
                    self.state.char_spacing = number(character).unwrap_or(0.0);
                    self.next_line();
                    self.show(&[ShowItem::Text(bytes)]);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let items: Vec<ShowItem<'_>> = items
                        .iter()
                        .filter_map(|item| match item {
                            Object::String(bytes, _) => Some(ShowItem::Text(bytes)),
                            other => number(other).map(ShowItem::Adjust),
                        })
                        .collect();
                    self.show(&items);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    fn show(&mut self, items: &[ShowItem<'_>]) {
        let font_name = self.state.font.clone();
        let widths = font_name
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback);
        let size = self.state.font_size;
        let scale = self.state.horizontal_scale;

        let start = self.text_matrix;
        let mut offset = 0.0f32;
        let mut text = String::new();
        for item in items {
            match item {
                ShowItem::Text(bytes) => {
                    for (code, width) in widths.codes(*bytes) {
                        let mut advance = width / 1000.0 * size + self.state.char_spacing;
                        if !widths.two_byte && code == 32 {
                            advance += self.state.word_spacing;
                        }
                        offset += advance * scale;
                    }
                    text.push_str(&(self.decode)(font_name.as_deref(), *bytes));
                }
                ShowItem::Adjust(amount) => {
                    offset -= amount / 1000.0 * size * scale;
                    if -amount > SPACE_ADJUSTMENT && !text.ends_with(' ') && !text.is_empty() {
                        text.push(' ');
                    }
                }
            }
        }
        self.text_matrix = Matrix::translate(offset, 0.0).then(&start);
        if text.is_empty() {
            return;
        }
        let bbox = self.fragment_box(&start, offset);
        self.fragments.push(TextFragment::new(bbox, text));
    }

    /// Page-local box of a run starting at `start` and `width` text units long.
    fn fragment_box(&self, start: &Matrix, width: f32) -> Rect {
        let size = self.state.font_size;
        let bottom = DESCENT_EM * size + self.state.rise;
        let top = ASCENT_EM * size + self.state.rise;
        let to_user = start.then(&self.state.ctm);
        let corners = [(0.0, bottom), (width, bottom), (0.0, top), (width, top)];
        let mut min = (f32::INFINITY, f32::INFINITY);
        let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (x, y) in corners {
            let (ux, uy) = to_user.apply(x, y);
            let (lx, ly) = self.page_box.to_local(ux, uy);
            min = (min.0.min(lx), min.1.min(ly));
            max = (max.0.max(lx), max.1.max(ly));
        }
        Rect::new(min.0, min.1, max.0, max.1)
    }
}

fn set_from(operands: &[Object], target: &mut f32) {
    if let Some(value) = operands.first().and_then(number) {
        *target = value;
    }
}

fn pair(operands: &[Object]) -> Option<(f32, f32)> {
    match operands {
        [x, y] => Some((number(x)?, number(y)?)),
        _ => None,
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| char::from(*byte)).collect()
}

pub(super) fn page_fragments(
    doc: &Document,
    page_id: ObjectId,
    page_box: &PageBox,
) -> Result<Vec<TextFragment>> {
    let content = doc
        .get_page_content(page_id)
        .with_context(|| "failed to read page content")?;
    let content = Content::decode(&content).with_context(|| "failed to decode page content")?;
    let page_fonts = doc
        .get_page_fonts(page_id)
        .with_context(|| "failed to read page fonts")?;

    let fonts = page_fonts
        .iter()
        .map(|(name, dict)| (name.clone(), FontWidths::from_dict(doc, dict)))
        .collect();
    let encodings: BTreeMap<_, _> = page_fonts
        .iter()
        .filter_map(|(name, dict)| {
            dict.get_font_encoding(doc)
                .ok()
                .map(|encoding| (name.clone(), encoding))
        })
        .collect();
    let decode = |font: Option<&[u8]>, bytes: &[u8]| {
        font.and_then(|name| encodings.get(name))
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
            .unwrap_or_else(|| latin1(bytes))
    };

    let mut interpreter = Interpreter {
        page_box,
        fonts,
        fallback: FontWidths::fallback(),
        decode,
        state: GraphicsState::default(),
        stack: Vec::new(),
        text_matrix: Matrix::IDENTITY,
        line_matrix: Matrix::IDENTITY,
        fragments: Vec::new(),
    };
    interpreter.run(&content.operations);
    Ok(interpreter.fragments)
}
