/// Wheel units per zoom stage; one notch of a line-based wheel.
pub(crate) const SCROLL_UNITS_PER_STAGE: f64 = 120.0;

/// Deepest zoom stage. Keeps the `1:N` ratio within `u32`.
pub(crate) const MAX_ZOOM_STAGE: u32 = 30;

/// Zoom level driven by the mouse wheel. Stage 0 is 1:1, each stage halves the
/// projected size.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct ZoomState {
    stage: u32,
    // Wheel delta not yet worth a whole stage
    pending: f64,
}

impl ZoomState {
    /// Accumulates a wheel delta. Positive deltas zoom out.
    pub(crate) fn apply_scroll(&mut self, delta: f64) {
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        self.pending += delta;

        let steps = (self.pending / SCROLL_UNITS_PER_STAGE).trunc();
        if steps == 0.0 {
            return;
        }
        self.pending -= steps * SCROLL_UNITS_PER_STAGE;

        let target = self.stage as f64 + steps;
        let clamped = target.clamp(0.0, MAX_ZOOM_STAGE as f64);
        if clamped != target {
            // Scrolling past either end does not bank a remainder
            self.pending = 0.0;
        }
        self.stage = clamped as u32;
    }

    pub(crate) fn stage(&self) -> u32 {
        self.stage
    }

    /// `2^-stage`, exact for every stage.
    pub(crate) fn factor(&self) -> f32 {
        0.5f32.powi(self.stage as i32)
    }

    pub(crate) fn ratio_label(&self) -> String {
        format!("Zoom = 1:{}", 1u32 << self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_to_one() {
        let zoom = ZoomState::default();
        assert_eq!(zoom.stage(), 0);
        assert_eq!(zoom.factor(), 1.0);
        assert_eq!(zoom.ratio_label(), "Zoom = 1:1");
    }

    #[test]
    fn one_notch_is_one_stage() {
        let mut zoom = ZoomState::default();
        zoom.apply_scroll(120.0);
        assert_eq!(zoom.stage(), 1);
        assert_eq!(zoom.factor(), 0.5);
        assert_eq!(zoom.ratio_label(), "Zoom = 1:2");

        zoom.apply_scroll(240.0);
        assert_eq!(zoom.stage(), 3);
        assert_eq!(zoom.ratio_label(), "Zoom = 1:8");

        zoom.apply_scroll(-120.0);
        assert_eq!(zoom.stage(), 2);
        assert_eq!(zoom.factor(), 0.25);
    }

    #[test]
    fn small_deltas_accumulate() {
        let mut zoom = ZoomState::default();
        for _ in 0..3 {
            zoom.apply_scroll(50.0);
        }
        assert_eq!(zoom.stage(), 1);

        // 30 left over plus 90 makes another stage
        zoom.apply_scroll(90.0);
        assert_eq!(zoom.stage(), 2);
    }

    #[test]
    fn stage_never_goes_below_zero() {
        let mut zoom = ZoomState::default();
        zoom.apply_scroll(-1200.0);
        assert_eq!(zoom.stage(), 0);
        assert_eq!(zoom.factor(), 1.0);

        // Nothing banked from scrolling past the floor
        zoom.apply_scroll(120.0);
        assert_eq!(zoom.stage(), 1);
    }

    #[test]
    fn stage_is_capped() {
        let mut zoom = ZoomState::default();
        zoom.apply_scroll(120.0 * 100.0);
        assert_eq!(zoom.stage(), MAX_ZOOM_STAGE);
        assert_eq!(zoom.factor(), 2f32.powi(-(MAX_ZOOM_STAGE as i32)));
        assert_eq!(zoom.ratio_label(), format!("Zoom = 1:{}", 1u32 << MAX_ZOOM_STAGE));
    }

    #[test]
    fn factor_is_exact_power_of_two() {
        let mut zoom = ZoomState::default();
        for stage in 1..=MAX_ZOOM_STAGE {
            zoom.apply_scroll(SCROLL_UNITS_PER_STAGE);
            assert_eq!(zoom.stage(), stage);
            assert_eq!(zoom.factor() * 2f32.powi(stage as i32), 1.0);
        }
    }
}
