use crate::geometry::Rect;

/// Font measurements the layout engine needs, in points at a given size.
pub trait TextMetrics {
    fn advance(&self, text: &str, font_size: f32) -> f32;
    fn ascent(&self, font_size: f32) -> f32;
    fn line_height(&self, font_size: f32) -> f32;
}

/// Text wrapped into a rectangle at one font size.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub rect: Rect,
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<LaidOutLine>,
    /// Unused vertical space below the last line.
    pub leftover: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutLine {
    pub text: String,
    pub width: f32,
}

/// The text needs more room than the rectangle offers at this size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitFailure {
    pub overflow: f32,
}

/// Overflow accepted when drawing a block that already measured as fitting;
/// centring can round its rect a hair short.
pub const COMMIT_TOLERANCE: f32 = 0.01;

pub fn layout_text<M: TextMetrics + ?Sized>(
    metrics: &M,
    rect: Rect,
    text: &str,
    font_size: f32,
) -> Result<TextBlock, FitFailure> {
    layout_text_within(metrics, rect, text, font_size, 0.0)
}

/// Like [`layout_text`], but lets the lines overrun the rect by up to
/// `tolerance` points. The reported leftover never goes below zero.
pub fn layout_text_within<M: TextMetrics + ?Sized>(
    metrics: &M,
    rect: Rect,
    text: &str,
    font_size: f32,
    tolerance: f32,
) -> Result<TextBlock, FitFailure> {
    let max_width = rect.width();
    if max_width <= 0.0 || font_size <= 0.0 {
        return Err(FitFailure { overflow: f32::INFINITY });
    }
    let lines = wrap_text(metrics, text, font_size, max_width);
    let line_height = metrics.line_height(font_size);
    let used = lines.len() as f32 * line_height;
    let leftover = rect.height() - used;
    if leftover < -tolerance {
        return Err(FitFailure { overflow: -leftover });
    }
    Ok(TextBlock {
        rect,
        font_size,
        line_height,
        lines,
        leftover: leftover.max(0.0),
    })
}

fn wrap_text<M: TextMetrics + ?Sized>(
    metrics: &M,
    text: &str,
    font_size: f32,
    max_width: f32,
) -> Vec<LaidOutLine> {
    let mut result = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if metrics.advance(&candidate, font_size) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                push_line(metrics, &mut result, std::mem::take(&mut current), font_size);
            }
            if metrics.advance(word, font_size) <= max_width {
                current = word.to_string();
            } else {
                current = break_word(metrics, &mut result, word, font_size, max_width);
            }
        }
        if !current.is_empty() {
            push_line(metrics, &mut result, current, font_size);
        }
    }
    result
}

/// Splits a word wider than the box between characters; returns the tail.
fn break_word<M: TextMetrics + ?Sized>(
    metrics: &M,
    result: &mut Vec<LaidOutLine>,
    word: &str,
    font_size: f32,
    max_width: f32,
) -> String {
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if metrics.advance(&current, font_size) > max_width && current.chars().count() > 1 {
            current.pop();
            push_line(metrics, result, std::mem::take(&mut current), font_size);
            current.push(ch);
        }
    }
    current
}

fn push_line<M: TextMetrics + ?Sized>(
    metrics: &M,
    result: &mut Vec<LaidOutLine>,
    text: String,
    font_size: f32,
) {
    let width = metrics.advance(&text, font_size);
    result.push(LaidOutLine { text, width });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Every character is half an em wide; lines are 1.2 em tall.
    pub(crate) struct FixedMetrics;

    impl TextMetrics for FixedMetrics {
        fn advance(&self, text: &str, font_size: f32) -> f32 {
            text.chars().count() as f32 * font_size * 0.5
        }

        fn ascent(&self, font_size: f32) -> f32 {
            font_size * 0.9
        }

        fn line_height(&self, font_size: f32) -> f32 {
            font_size * 1.2
        }
    }

    #[test]
    fn short_text_fits_on_one_line() {
        let rect = Rect::new(0.0, 0.0, 100.0, 30.0);
        let block = layout_text(&FixedMetrics, rect, "245.00", 10.0).unwrap();
        assert_eq!(block.lines.len(), 1);
        assert_eq!(block.lines[0].text, "245.00");
        assert_eq!(block.lines[0].width, 30.0);
        assert!((block.leftover - 18.0).abs() < 1e-4);
    }

    #[test]
    fn tolerance_absorbs_rounding_only() {
        // One line at size 10 is 12pt tall.
        let rect = Rect::new(0.0, 0.0, 100.0, 11.995);
        assert!(layout_text(&FixedMetrics, rect, "245.00", 10.0).is_err());
        let block =
            layout_text_within(&FixedMetrics, rect, "245.00", 10.0, COMMIT_TOLERANCE).unwrap();
        assert_eq!(block.leftover, 0.0);
        assert_eq!(block.lines.len(), 1);

        let short = Rect::new(0.0, 0.0, 100.0, 11.5);
        assert!(layout_text_within(&FixedMetrics, short, "245.00", 10.0, COMMIT_TOLERANCE).is_err());
    }

    #[test]
    fn words_wrap_greedily() {
        // 10 chars per line at size 10 in a 50pt box.
        let rect = Rect::new(0.0, 0.0, 50.0, 100.0);
        let block = layout_text(&FixedMetrics, rect, "total due amount now", 10.0).unwrap();
        let lines: Vec<&str> = block.lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(lines, vec!["total due", "amount now"]);
    }

    #[test]
    fn overlong_word_breaks_between_characters() {
        let rect = Rect::new(0.0, 0.0, 20.0, 100.0);
        let block = layout_text(&FixedMetrics, rect, "abcdefghij", 10.0).unwrap();
        let lines: Vec<&str> = block.lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn explicit_newlines_start_new_lines() {
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        let block = layout_text(&FixedMetrics, rect, "first\nsecond", 10.0).unwrap();
        assert_eq!(block.lines.len(), 2);
    }

    #[test]
    fn too_many_lines_is_a_failure() {
        let rect = Rect::new(0.0, 0.0, 50.0, 20.0);
        let failure = layout_text(&FixedMetrics, rect, "one two three four five", 10.0).unwrap_err();
        assert!(failure.overflow > 0.0);
    }

    #[test]
    fn degenerate_width_never_fits() {
        let rect = Rect::new(10.0, 0.0, 10.0, 100.0);
        assert!(layout_text(&FixedMetrics, rect, "x", 10.0).is_err());
    }
}
