//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::geometry::{GeometryFlags, RegionGeometry};
use crate::image::Page;
use crate::keywords::Gravity;

/// A rectangle in image coordinates. `x`/`y` may be negative before clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with a `width`x`height` image. `None` if nothing remains.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(width as i64);
        let y1 = (self.y + self.height as i64).min(height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Target dimensions for a resize-family geometry.
///
/// # Arguments
/// * `source` - Current image dimensions (width, height)
/// * `region` - Parsed geometry, e.g. `640x480`, `50%`, `100x100^`, `10000@`
///
/// # Returns
/// * `(width, height)` - never smaller than 1x1
///
/// # Examples
/// ```
/// # use wand_cli::geometry::parse_region;
/// # use wand_cli::imaging::resize_dimensions;
/// // Fit inside 100x100 keeping aspect ratio
/// assert_eq!(resize_dimensions((400, 200), &parse_region("100x100").unwrap()), (100, 50));
///
/// // Only shrink larger images
/// assert_eq!(resize_dimensions((50, 20), &parse_region("100x100>").unwrap()), (50, 20));
/// ```
pub fn resize_dimensions(source: (u32, u32), region: &RegionGeometry) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1) as f64, source.1.max(1) as f64);

    if region.has(GeometryFlags::AREA) {
        let area = region.width.unwrap_or(src_w * src_h);
        let current = src_w * src_h;
        if (region.has(GeometryFlags::GREATER) && current <= area)
            || (region.has(GeometryFlags::LESS) && current >= area)
        {
            return source;
        }
        let scale = (area / current).sqrt();
        return clamp_dims(src_w * scale, src_h * scale);
    }

    let (mut target_w, mut target_h) = if region.has(GeometryFlags::PERCENT) {
        let px = region.width.unwrap_or(100.0);
        let py = region.height.unwrap_or(px);
        (src_w * px / 100.0, src_h * py / 100.0)
    } else {
        match (region.width, region.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, src_h * w / src_w),
            (None, Some(h)) => (src_w * h / src_h, h),
            (None, None) => (src_w, src_h),
        }
    };

    let exact = region.has(GeometryFlags::PERCENT)
        || region.has(GeometryFlags::ASPECT)
        || region.width.is_none()
        || region.height.is_none();
    if !exact {
        let scale_x = target_w / src_w;
        let scale_y = target_h / src_h;
        let scale = if region.has(GeometryFlags::MINIMUM) {
            scale_x.max(scale_y)
        } else {
            scale_x.min(scale_y)
        };
        target_w = src_w * scale;
        target_h = src_h * scale;
    }

    if region.has(GeometryFlags::GREATER) && src_w <= target_w && src_h <= target_h {
        return source;
    }
    if region.has(GeometryFlags::LESS) && src_w >= target_w && src_h >= target_h {
        return source;
    }
    clamp_dims(target_w, target_h)
}

fn clamp_dims(w: f64, h: f64) -> (u32, u32) {
    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// Position of an `object` inside a `canvas` for a gravity, plus an offset.
///
/// Offsets point inward from the gravity edge, so `+10+0` with `East` moves
/// the object 10 pixels left of the right edge.
pub fn gravity_offset(
    gravity: Gravity,
    canvas: (u32, u32),
    object: (u32, u32),
    offset: (i64, i64),
) -> (i64, i64) {
    let (cw, ch) = (canvas.0 as i64, canvas.1 as i64);
    let (ow, oh) = (object.0 as i64, object.1 as i64);
    let (dx, dy) = offset;
    let x = match gravity {
        Gravity::NorthWest | Gravity::West | Gravity::SouthWest => dx,
        Gravity::North | Gravity::Center | Gravity::South => (cw - ow) / 2 + dx,
        Gravity::NorthEast | Gravity::East | Gravity::SouthEast => cw - ow - dx,
        Gravity::Undefined | Gravity::Forget => dx,
    };
    let y = match gravity {
        Gravity::NorthWest | Gravity::North | Gravity::NorthEast => dy,
        Gravity::West | Gravity::Center | Gravity::East => (ch - oh) / 2 + dy,
        Gravity::SouthWest | Gravity::South | Gravity::SouthEast => ch - oh - dy,
        Gravity::Undefined | Gravity::Forget => dy,
    };
    (x, y)
}

/// Regions produced by `-crop` on a `width`x`height` image.
///
/// - `WxH+X+Y`: a single region (clipped to the image).
/// - `WxH` with no offset: tiles of that size covering the image.
/// - `NxM@`: the image split into NxM roughly equal tiles.
///
/// An empty vector means the region missed the image entirely.
pub fn crop_regions(source: (u32, u32), region: &RegionGeometry) -> Vec<Rect> {
    let (src_w, src_h) = source;
    if region.has(GeometryFlags::AREA) {
        let cols = region.width.unwrap_or(1.0).max(1.0) as u32;
        let rows = region.height.or(region.width).unwrap_or(1.0).max(1.0) as u32;
        let mut tiles = Vec::new();
        for row in 0..rows {
            let y0 = (row as u64 * src_h as u64 / rows as u64) as i64;
            let y1 = ((row + 1) as u64 * src_h as u64 / rows as u64) as i64;
            for col in 0..cols {
                let x0 = (col as u64 * src_w as u64 / cols as u64) as i64;
                let x1 = ((col + 1) as u64 * src_w as u64 / cols as u64) as i64;
                if x1 > x0 && y1 > y0 {
                    tiles.push(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32));
                }
            }
        }
        return tiles;
    }

    let scale = |v: Option<f64>, full: u32| -> u32 {
        match v {
            Some(v) if region.has(GeometryFlags::PERCENT) => (full as f64 * v / 100.0).round() as u32,
            Some(v) => v as u32,
            None => full,
        }
    };
    let tile_w = scale(region.width, src_w);
    let tile_h = scale(region.height.or(region.width), src_h);
    let (tile_w, tile_h) = (
        if tile_w == 0 { src_w } else { tile_w },
        if tile_h == 0 { src_h } else { tile_h },
    );

    if region.has_offset() {
        return Rect::new(region.x, region.y, tile_w, tile_h)
            .clip_to(src_w, src_h)
            .into_iter()
            .collect();
    }

    let mut tiles = Vec::new();
    let mut y = 0i64;
    while y < src_h as i64 {
        let mut x = 0i64;
        while x < src_w as i64 {
            if let Some(r) = Rect::new(x, y, tile_w, tile_h).clip_to(src_w, src_h) {
                tiles.push(r);
            }
            x += tile_w as i64;
        }
        y += tile_h as i64;
    }
    tiles
}

/// Bounding box of a set of pages on the virtual canvas: `(x, y, w, h)`.
///
/// Pages with an unset canvas contribute their own image size at their offset.
pub fn layer_bounds(layers: &[(Page, (u32, u32))]) -> Rect {
    let mut min_x = i64::MAX;
    let mut min_y = i64::MAX;
    let mut max_x = i64::MIN;
    let mut max_y = i64::MIN;
    for (page, (w, h)) in layers {
        min_x = min_x.min(page.x);
        min_y = min_y.min(page.y);
        max_x = max_x.max(page.x + *w as i64);
        max_y = max_y.max(page.y + *h as i64);
    }
    if layers.is_empty() {
        return Rect::default();
    }
    Rect::new(min_x, min_y, (max_x - min_x) as u32, (max_y - min_y) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::parse_region;

    fn resize(src: (u32, u32), geometry: &str) -> (u32, u32) {
        resize_dimensions(src, &parse_region(geometry).unwrap())
    }

    // =========================================================================
    // resize_dimensions tests
    // =========================================================================

    #[test]
    fn resize_fits_inside_box() {
        assert_eq!(resize((800, 600), "400x400"), (400, 300));
        assert_eq!(resize((600, 800), "400x400"), (300, 400));
    }

    #[test]
    fn resize_fill_uses_larger_scale() {
        // Same result as the old fill calculation: one side matches, the other exceeds
        assert_eq!(resize((800, 600), "400x500^"), (667, 500));
    }

    #[test]
    fn resize_ignore_aspect() {
        assert_eq!(resize((800, 600), "100x100!"), (100, 100));
    }

    #[test]
    fn resize_single_dimension_keeps_aspect() {
        assert_eq!(resize((800, 600), "400"), (400, 300));
        assert_eq!(resize((800, 600), "x300"), (400, 300));
    }

    #[test]
    fn resize_percent() {
        assert_eq!(resize((800, 600), "50%"), (400, 300));
        assert_eq!(resize((800, 600), "50x25%"), (400, 150));
    }

    #[test]
    fn resize_shrink_and_enlarge_only() {
        assert_eq!(resize((50, 20), "100x100>"), (50, 20));
        assert_eq!(resize((400, 200), "100x100>"), (100, 50));
        assert_eq!(resize((400, 200), "100x100<"), (400, 200));
        assert_eq!(resize((50, 20), "100x100<"), (100, 40));
    }

    #[test]
    fn resize_area_limit() {
        assert_eq!(resize((200, 200), "10000@"), (100, 100));
    }

    // =========================================================================
    // gravity_offset tests
    // =========================================================================

    #[test]
    fn gravity_positions() {
        let canvas = (100, 100);
        let object = (20, 10);
        assert_eq!(gravity_offset(Gravity::NorthWest, canvas, object, (0, 0)), (0, 0));
        assert_eq!(gravity_offset(Gravity::Center, canvas, object, (0, 0)), (40, 45));
        assert_eq!(gravity_offset(Gravity::SouthEast, canvas, object, (5, 5)), (75, 85));
        assert_eq!(gravity_offset(Gravity::Undefined, canvas, object, (3, 4)), (3, 4));
    }

    // =========================================================================
    // crop_regions tests
    // =========================================================================

    #[test]
    fn crop_single_region_is_clipped() {
        let regions = crop_regions((100, 80), &parse_region("50x50+70+60").unwrap());
        assert_eq!(regions, vec![Rect::new(70, 60, 30, 20)]);
    }

    #[test]
    fn crop_outside_is_empty() {
        assert!(crop_regions((100, 80), &parse_region("10x10+200+0").unwrap()).is_empty());
    }

    #[test]
    fn crop_without_offset_tiles() {
        let regions = crop_regions((100, 50), &parse_region("50x50").unwrap());
        assert_eq!(regions, vec![Rect::new(0, 0, 50, 50), Rect::new(50, 0, 50, 50)]);
        let regions = crop_regions((90, 40), &parse_region("40x40").unwrap());
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[2], Rect::new(80, 0, 10, 40));
    }

    #[test]
    fn crop_equal_tiles() {
        let regions = crop_regions((100, 100), &parse_region("2x2@").unwrap());
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[3], Rect::new(50, 50, 50, 50));
    }

    #[test]
    fn layer_bounds_cover_all_offsets() {
        let a = Page { x: -10, y: 0, ..Page::default() };
        let b = Page { x: 20, y: 5, ..Page::default() };
        let bounds = layer_bounds(&[(a, (30, 10)), (b, (10, 10))]);
        assert_eq!(bounds, Rect::new(-10, 0, 40, 15));
    }
}
