//! Corner-relative widget placement.
//!
//! A position is stored as an offset from the nearest screen corner, measured
//! from the widget's matching edge (a top-right anchor stores the gap between
//! the widget's right edge and the screen's right edge). Re-applying the offset
//! on another resolution keeps the widget in the same visual corner.

use serde::{Deserialize, Serialize};

/// Pixels of the widget that must overlap a screen, per axis, to count as visible.
pub const MIN_VISIBLE: i32 = 50;

pub const DEFAULT_OFFSET: i32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Available area of one screen in virtual-desktop coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenGeometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    fn overlap(&self, pos: Point, size: Size) -> (i32, i32) {
        let w = pos
            .x
            .saturating_add(size.width)
            .min(self.right())
            .saturating_sub(pos.x.max(self.x));
        let h = pos
            .y
            .saturating_add(size.height)
            .min(self.bottom())
            .saturating_sub(pos.y.max(self.y));
        (w.max(0), h.max(0))
    }
}

/// Used when no screen is reported at all.
pub const FALLBACK_SCREEN: ScreenGeometry = ScreenGeometry {
    x: 0,
    y: 0,
    width: 1920,
    height: 1080,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Offset of a widget at `pos` from this corner of `screen`.
    fn offset(self, pos: Point, size: Size, screen: &ScreenGeometry) -> (i32, i32) {
        let from_left = pos.x.saturating_sub(screen.x);
        let from_top = pos.y.saturating_sub(screen.y);
        let from_right = screen.right().saturating_sub(pos.x).saturating_sub(size.width);
        let from_bottom = screen.bottom().saturating_sub(pos.y).saturating_sub(size.height);

        match self {
            Corner::TopLeft => (from_left, from_top),
            Corner::TopRight => (from_right, from_top),
            Corner::BottomLeft => (from_left, from_bottom),
            Corner::BottomRight => (from_right, from_bottom),
        }
    }
}

/// Persisted widget placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerAnchor {
    pub corner: Corner,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Screen the offset was measured against.
    pub screen: ScreenGeometry,
}

/// Anchor `pos` to whichever corner of `screen` it is closest to
/// (smallest Manhattan offset; ties go to the earlier corner in `Corner::ALL`).
pub fn anchor_for(pos: Point, size: Size, screen: ScreenGeometry) -> CornerAnchor {
    let (corner, (offset_x, offset_y)) = Corner::ALL
        .iter()
        .map(|c| (*c, c.offset(pos, size, &screen)))
        .min_by_key(|(_, (ox, oy))| ox.unsigned_abs() as u64 + oy.unsigned_abs() as u64)
        .unwrap_or((Corner::TopLeft, Corner::TopLeft.offset(pos, size, &screen)));

    CornerAnchor {
        corner,
        offset_x,
        offset_y,
        screen,
    }
}

/// Absolute position of `anchor` re-applied to `screen`.
///
/// Offsets come from a file on disk, so the arithmetic saturates; an absurd
/// offset lands far off-screen and fails the visibility check instead of
/// overflowing.
pub fn resolve(anchor: &CornerAnchor, size: Size, screen: &ScreenGeometry) -> Point {
    let left = screen.x.saturating_add(anchor.offset_x);
    let top = screen.y.saturating_add(anchor.offset_y);
    let right = screen
        .right()
        .saturating_sub(size.width)
        .saturating_sub(anchor.offset_x);
    let bottom = screen
        .bottom()
        .saturating_sub(size.height)
        .saturating_sub(anchor.offset_y);

    match anchor.corner {
        Corner::TopLeft => Point::new(left, top),
        Corner::TopRight => Point::new(right, top),
        Corner::BottomLeft => Point::new(left, bottom),
        Corner::BottomRight => Point::new(right, bottom),
    }
}

/// Screen an anchor should be re-applied to: the one at the stored origin,
/// else the one containing it, else the primary (first) screen.
pub fn reference_screen<'a>(
    anchor: &CornerAnchor,
    screens: &'a [ScreenGeometry],
) -> Option<&'a ScreenGeometry> {
    let origin = Point::new(anchor.screen.x, anchor.screen.y);
    screens
        .iter()
        .find(|s| s.x == origin.x && s.y == origin.y)
        .or_else(|| screens.iter().find(|s| s.contains(origin)))
        .or_else(|| screens.first())
}

/// True when at least `MIN_VISIBLE` px of the widget (capped at its own size)
/// overlap one screen in both axes.
pub fn is_visible(pos: Point, size: Size, screens: &[ScreenGeometry]) -> bool {
    let need_w = MIN_VISIBLE.min(size.width.max(1));
    let need_h = MIN_VISIBLE.min(size.height.max(1));

    screens.iter().any(|s| {
        let (w, h) = s.overlap(pos, size);
        w >= need_w && h >= need_h
    })
}

/// Primary screen's top-left corner, inset by `DEFAULT_OFFSET` where it fits.
pub fn safe_default(size: Size, screens: &[ScreenGeometry]) -> Point {
    let primary = screens.first().copied().unwrap_or(FALLBACK_SCREEN);

    let max_x = primary.right().saturating_sub(size.width).max(primary.x);
    let max_y = primary.bottom().saturating_sub(size.height).max(primary.y);

    Point::new(
        primary.x.saturating_add(DEFAULT_OFFSET).min(max_x),
        primary.y.saturating_add(DEFAULT_OFFSET).min(max_y),
    )
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn anchor_round_trips_on_same_screen(
            sx in -2000i32..2000,
            sy in -1000i32..1000,
            w in 640i32..4000,
            h in 480i32..2200,
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
        ) {
            let size = Size::new(200, 50);
            let screen = ScreenGeometry::new(sx, sy, w, h);
            let pos = Point::new(
                sx + ((w - size.width) as f64 * fx) as i32,
                sy + ((h - size.height) as f64 * fy) as i32,
            );

            let a = anchor_for(pos, size, screen);
            prop_assert_eq!(resolve(&a, size, &screen), pos);
            prop_assert!(a.offset_x >= 0 && a.offset_y >= 0);
            prop_assert!(is_visible(pos, size, &[screen]));
        }
    }
}
