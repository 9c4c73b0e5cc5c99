use super::{Extent, Rect, Vec2};

/// How a camera frame is fitted into the preview surface.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ResizeMode {
    /// Aspect fill: the frame covers the whole surface, overflow is cropped.
    #[default]
    Cover,
    /// Aspect fit: the whole frame is visible, letterboxed as needed.
    Contain,
}

/// Placement of a frame inside a surface, plus conversions between the two.
///
/// Frame coordinates are normalized (`0..1`, top-left origin, as captured by
/// the sensor). Surface coordinates are physical pixels, top-left origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PreviewTransform {
    surface: Extent,
    placement: Rect,
    mirrored: bool,
}

impl PreviewTransform {
    pub fn new(frame: Extent, surface: Extent, mode: ResizeMode, mirrored: bool) -> Self {
        if frame.is_empty() || surface.is_empty() {
            return Self::fill(surface, mirrored);
        }

        let sx = surface.width as f32 / frame.width as f32;
        let sy = surface.height as f32 / frame.height as f32;
        let scale = match mode {
            ResizeMode::Cover => sx.max(sy),
            ResizeMode::Contain => sx.min(sy),
        };

        let w = frame.width as f32 * scale;
        let h = frame.height as f32 * scale;
        let x = (surface.width as f32 - w) * 0.5;
        let y = (surface.height as f32 - h) * 0.5;

        Self {
            surface,
            placement: Rect::new(x, y, w, h),
            mirrored,
        }
    }

    /// Stretches the frame over the whole surface. Used before the first frame
    /// is known.
    pub fn fill(surface: Extent, mirrored: bool) -> Self {
        Self {
            surface,
            placement: Rect::new(0.0, 0.0, surface.width as f32, surface.height as f32),
            mirrored,
        }
    }

    /// Frame rectangle in surface pixels. May extend past the surface in
    /// `Cover` mode.
    pub fn placement(&self) -> Rect {
        self.placement
    }

    /// Part of the surface actually covered by the frame.
    pub fn visible_rect(&self) -> Option<Rect> {
        let bounds = Rect::new(0.0, 0.0, self.surface.width as f32, self.surface.height as f32);
        self.placement.intersect(bounds)
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Converts a surface point to a normalized frame point.
    ///
    /// Returns `None` when the point falls outside the frame (letterbox bars).
    pub fn surface_point_to_frame(&self, p: Vec2) -> Option<Vec2> {
        if self.placement.is_empty() || !self.placement.contains(p) {
            return None;
        }
        let local = p - self.placement.origin;
        let mut x = local.x / self.placement.size.x;
        let y = local.y / self.placement.size.y;
        if self.mirrored {
            x = 1.0 - x;
        }
        Some(Vec2::new(x, y))
    }

    /// Converts a normalized frame rectangle to surface pixels.
    pub fn frame_rect_to_surface(&self, r: Rect) -> Rect {
        let r = r.normalized();
        let x = if self.mirrored { 1.0 - r.origin.x - r.size.x } else { r.origin.x };
        Rect::new(
            self.placement.origin.x + x * self.placement.size.x,
            self.placement.origin.y + r.origin.y * self.placement.size.y,
            r.size.x * self.placement.size.x,
            r.size.y * self.placement.size.y,
        )
    }

    /// Scale and offset mapping the unit quad `[-1, 1]²` onto the placement in
    /// normalized device coordinates (+Y up).
    pub fn ndc_scale_offset(&self) -> ([f32; 2], [f32; 2]) {
        let sw = self.surface.width.max(1) as f32;
        let sh = self.surface.height.max(1) as f32;
        let p = self.placement;

        let scale = [p.size.x / sw, p.size.y / sh];
        let cx = (p.origin.x + p.size.x * 0.5) / sw * 2.0 - 1.0;
        let cy = 1.0 - (p.origin.y + p.size.y * 0.5) / sh * 2.0;
        (scale, [cx, cy])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vga() -> Extent { Extent::new(640, 480) }
    fn square() -> Extent { Extent::new(480, 480) }

    // ── placement ─────────────────────────────────────────────────────────

    #[test]
    fn cover_crops_the_long_side() {
        let t = PreviewTransform::new(vga(), square(), ResizeMode::Cover, false);
        assert_eq!(t.placement(), Rect::new(-80.0, 0.0, 640.0, 480.0));
        assert_eq!(t.visible_rect(), Some(Rect::new(0.0, 0.0, 480.0, 480.0)));
    }

    #[test]
    fn contain_letterboxes() {
        let t = PreviewTransform::new(vga(), square(), ResizeMode::Contain, false);
        assert_eq!(t.placement(), Rect::new(0.0, 60.0, 480.0, 360.0));
    }

    #[test]
    fn matching_aspect_fills_in_both_modes() {
        let surface = Extent::new(1280, 960);
        for mode in [ResizeMode::Cover, ResizeMode::Contain] {
            let t = PreviewTransform::new(vga(), surface, mode, false);
            assert_eq!(t.placement(), Rect::new(0.0, 0.0, 1280.0, 960.0));
        }
    }

    #[test]
    fn empty_frame_falls_back_to_fill() {
        let t = PreviewTransform::new(Extent::new(0, 0), square(), ResizeMode::Contain, false);
        assert_eq!(t, PreviewTransform::fill(square(), false));
    }

    // ── conversions ───────────────────────────────────────────────────────

    #[test]
    fn center_maps_to_frame_center() {
        let t = PreviewTransform::new(vga(), square(), ResizeMode::Cover, false);
        assert_eq!(t.surface_point_to_frame(Vec2::new(240.0, 240.0)), Some(Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn letterbox_bar_is_outside_frame() {
        let t = PreviewTransform::new(vga(), square(), ResizeMode::Contain, false);
        assert_eq!(t.surface_point_to_frame(Vec2::new(240.0, 10.0)), None);
    }

    #[test]
    fn mirroring_flips_x() {
        let t = PreviewTransform::new(vga(), Extent::new(640, 480), ResizeMode::Cover, true);
        let p = t.surface_point_to_frame(Vec2::new(160.0, 120.0)).unwrap();
        assert_eq!(p, Vec2::new(0.75, 0.25));
    }

    #[test]
    fn frame_rect_round_trips_through_surface_point() {
        let t = PreviewTransform::new(vga(), square(), ResizeMode::Contain, true);
        let r = t.frame_rect_to_surface(Rect::new(0.25, 0.25, 0.5, 0.5));
        let center = r.origin + r.size * 0.5;
        assert_eq!(t.surface_point_to_frame(center), Some(Vec2::new(0.5, 0.5)));
    }

    // ── ndc ───────────────────────────────────────────────────────────────

    #[test]
    fn fill_is_identity_in_ndc() {
        let (scale, offset) = PreviewTransform::fill(square(), false).ndc_scale_offset();
        assert_eq!(scale, [1.0, 1.0]);
        assert_eq!(offset, [0.0, 0.0]);
    }

    #[test]
    fn contain_scales_height_in_ndc() {
        let (scale, offset) =
            PreviewTransform::new(vga(), square(), ResizeMode::Contain, false).ndc_scale_offset();
        assert_eq!(scale, [1.0, 0.75]);
        assert_eq!(offset, [0.0, 0.0]);
    }
}
