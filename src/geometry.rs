use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page-local coordinates (top-left origin, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f32; 4]", from = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Overlap test with inclusive edges: rectangles that only touch count.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x1 < other.x0 || self.x0 > other.x1 || self.y1 < other.y0 || self.y0 > other.y1)
    }

    /// Grows the rectangle vertically. Never use the result for erasing.
    pub fn pad_vertical(&self, top: f32, bottom: f32) -> Rect {
        Rect {
            y0: self.y0 - top,
            y1: self.y1 + bottom,
            ..*self
        }
    }

    /// Moves the top edge down, keeping the bottom and both sides in place.
    pub fn shift_top(&self, offset: f32) -> Rect {
        Rect {
            y0: self.y0 + offset,
            ..*self
        }
    }
}

impl From<[f32; 4]> for Rect {
    fn from([x0, y0, x1, y1]: [f32; 4]) -> Self {
        Rect { x0, y0, x1, y1 }
    }
}

impl From<Rect> for [f32; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

pub fn intersects(a: &Rect, b: &Rect) -> bool {
    a.intersects(b)
}

pub fn pad_vertical(rect: &Rect, top: f32, bottom: f32) -> Rect {
    rect.pad_vertical(top, bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_is_symmetric() {
        let cases = [
            (Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(5.0, 5.0, 15.0, 15.0)),
            (Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(11.0, 0.0, 20.0, 10.0)),
            (Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(2.0, 2.0, 3.0, 3.0)),
            (Rect::new(0.0, 20.0, 10.0, 30.0), Rect::new(0.0, 0.0, 10.0, 19.5)),
        ];
        for (a, b) in cases {
            assert_eq!(intersects(&a, &b), intersects(&b, &a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn touching_edges_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(intersects(&a, &Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert!(intersects(&a, &Rect::new(0.0, 10.0, 10.0, 20.0)));
        assert!(intersects(&a, &Rect::new(10.0, 10.0, 12.0, 12.0)));
    }

    #[test]
    fn disjoint_rects_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!intersects(&a, &Rect::new(10.5, 0.0, 20.0, 10.0)));
        assert!(!intersects(&a, &Rect::new(0.0, -5.0, 10.0, -0.1)));
    }

    #[test]
    fn partial_overlap_is_enough() {
        let region = Rect::new(100.0, 700.0, 300.0, 720.0);
        let fragment = Rect::new(250.0, 690.0, 400.0, 705.0);
        assert!(intersects(&fragment, &region));
    }

    #[test]
    fn pad_vertical_only_moves_y() {
        let rect = Rect::new(100.0, 700.0, 300.0, 720.0);
        let padded = pad_vertical(&rect, 2.0, 14.0);
        assert_eq!(padded, Rect::new(100.0, 698.0, 300.0, 734.0));
        assert_eq!(padded.x0, rect.x0);
        assert_eq!(padded.x1, rect.x1);
        assert_eq!(pad_vertical(&rect, 0.0, 0.0), rect);
    }

    #[test]
    fn rect_uses_array_form_in_config() {
        let rect: Rect = serde_json::from_str("[1, 2, 3, 4]").unwrap();
        assert_eq!(rect, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(serde_json::to_string(&rect).unwrap(), "[1.0,2.0,3.0,4.0]");
    }
}
