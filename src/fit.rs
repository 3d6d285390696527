use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::geometry::Rect;

/// Result of a dry-run layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Everything fits; `leftover` is the unused vertical space.
    Fits { leftover: f32 },
    Overflow,
}

/// Drawing surface of one page.
///
/// `measure` only borrows the canvas immutably, so it cannot draw; `commit`
/// is the single operation that changes visible content.
pub trait Canvas {
    fn erase(&mut self, rect: Rect) -> Result<()>;
    fn measure(&self, rect: Rect, text: &str, font_size: f32) -> Measurement;
    fn commit(&mut self, rect: Rect, text: &str, font_size: f32) -> Result<()>;
    /// Flushes pending drawing into the page.
    fn finish(self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitResult {
    pub fitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leftover_space: Option<f32>,
}

impl FitResult {
    fn unfit() -> Self {
        Self {
            fitted: false,
            font_size: None,
            leftover_space: None,
        }
    }
}

/// Upper bound on the sizes tried for one region.
pub const MAX_SIZE_STEPS: usize = 200;

/// Inclusive range of candidate font sizes, searched from `max` down to `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeRange {
    pub max: f32,
    pub min: f32,
}

impl SizeRange {
    pub fn new(max: f32, min: f32) -> Self {
        Self { max, min }
    }

    /// Candidate sizes in one-point steps, largest first, at most
    /// `MAX_SIZE_STEPS` of them.
    pub fn candidates(&self) -> impl Iterator<Item = f32> + '_ {
        let steps = if self.max.is_finite() && self.min.is_finite() && self.max >= self.min {
            ((self.max - self.min).floor() as usize).saturating_add(1)
        } else {
            0
        };
        let steps = steps.min(MAX_SIZE_STEPS);
        (0..steps).map(move |step| self.max - step as f32)
    }
}

impl Default for SizeRange {
    fn default() -> Self {
        Self { max: 10.0, min: 6.0 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFitter {
    sizes: SizeRange,
}

impl TextFitter {
    pub fn new(sizes: SizeRange) -> Self {
        Self { sizes }
    }

    pub fn sizes(&self) -> SizeRange {
        self.sizes
    }

    /// Picks the largest size that fits, centres the block vertically and
    /// draws it once. Nothing is drawn when no size fits.
    pub fn fit_and_render<C: Canvas>(
        &self,
        canvas: &mut C,
        rect: Rect,
        text: &str,
    ) -> Result<FitResult> {
        let Some((font_size, leftover)) = self.measure(canvas, rect, text) else {
            return Ok(FitResult::unfit());
        };
        let centered = rect.shift_top(leftover / 2.0);
        canvas.commit(centered, text, font_size)?;
        Ok(FitResult {
            fitted: true,
            font_size: Some(font_size),
            leftover_space: Some(leftover),
        })
    }

    fn measure<C: Canvas>(&self, canvas: &C, rect: Rect, text: &str) -> Option<(f32, f32)> {
        for font_size in self.sizes.candidates() {
            match canvas.measure(rect, text, font_size) {
                Measurement::Fits { leftover } if leftover >= 0.0 => {
                    return Some((font_size, leftover));
                }
                _ => debug!(font_size, "text does not fit"),
            }
        }
        None
    }
}
