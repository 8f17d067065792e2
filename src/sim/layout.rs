//! Board geometry derived from the viewport
//!
//! A `Layout` is a pure function of viewport size, row count and particle
//! count. It is recomputed wholesale on any change and never patched in
//! place. The engine only sees the narrower `BoardGeom` view.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::{finite_or, lerp};

/// Viewport in logical (CSS) pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    /// Device pixel ratio, informational only
    pub dpr: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            dpr: 1.0,
        }
    }
}

/// Funnel the particles are emitted from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hopper {
    pub top: f32,
    pub bottom: f32,
    pub top_half_width: f32,
    pub neck_half_width: f32,
}

/// Region under the last peg row where bins stack up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accumulation {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Accumulation {
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Geometry the engine needs each tick. Immutable for the whole `update` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardGeom {
    pub emit_x: f32,
    pub emit_y: f32,
    pub center_x: f32,
    pub board_top: f32,
    pub board_bottom: f32,
    pub peg_spacing: f32,
    pub num_rows: u32,
    pub acc_bottom: f32,
    /// Horizontal bounds particles are clamped to
    pub left: f32,
    pub right: f32,
}

impl BoardGeom {
    /// Y of a peg row, linear between board top and bottom
    pub fn peg_y(&self, row: u32) -> f32 {
        if self.num_rows <= 1 {
            return self.board_top;
        }
        let row = row.min(self.num_rows - 1);
        let t = row as f32 / (self.num_rows - 1) as f32;
        lerp(self.board_top, self.board_bottom, t)
    }

    /// X of peg `index` in `row`; row `r` has `r + 1` centred slots
    pub fn peg_x(&self, row: u32, index: u32) -> f32 {
        let row = row.min(self.num_rows.saturating_sub(1));
        let index = index.min(row);
        self.center_x + (index as f32 - row as f32 / 2.0) * self.peg_spacing
    }

    /// Centre X of a bin slot under the last row
    pub fn bin_x(&self, bin: u32) -> f32 {
        let bin = bin.min(self.num_rows);
        self.center_x + (bin as f32 - self.num_rows as f32 / 2.0) * self.peg_spacing
    }

    /// Bin whose centre is nearest to `x`
    pub fn nearest_bin(&self, x: f32) -> u32 {
        let slot = (x - self.center_x) / self.peg_spacing + self.num_rows as f32 / 2.0;
        let slot = finite_or(slot, 0.0).round();
        slot.clamp(0.0, self.num_rows as f32) as u32
    }

    pub fn bin_count(&self) -> usize {
        self.num_rows as usize + 1
    }
}

/// Complete geometry record for one viewport/configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub viewport: Viewport,
    pub total_particles: u32,
    pub margin: f32,
    pub content_width: f32,
    pub row_spacing: f32,
    pub hopper: Hopper,
    pub accumulation: Accumulation,
    /// Height of one settled particle layer
    pub stack_row_h: f32,
    pub geom: BoardGeom,
}

impl Layout {
    pub fn compute(viewport: Viewport, num_rows: u32, total_particles: u32) -> Self {
        let width = finite_or(viewport.width, 0.0).max(MIN_EXTENT);
        let height = finite_or(viewport.height, 0.0).max(MIN_EXTENT);
        let rows = num_rows as f32;

        let margin = width.min(height) * 0.04;
        let content_width = (width - 2.0 * margin).max(MIN_EXTENT);

        let width_spacing = content_width / (rows + 2.0);
        let peg_spacing = if num_rows > 1 {
            let aspect_spacing = height * BOARD_HEIGHT_FRACTION / ((rows - 1.0) * ROW_ASPECT);
            width_spacing.min(aspect_spacing)
        } else {
            width_spacing
        };
        let peg_spacing = finite_or(peg_spacing, MIN_PEG_SPACING).max(MIN_PEG_SPACING);
        let row_spacing = peg_spacing * ROW_ASPECT;
        let board_height = if num_rows > 1 {
            (rows - 1.0) * row_spacing
        } else {
            0.0
        };

        let center_x = width / 2.0;

        let hopper_top = margin;
        let hopper_bottom = hopper_top + (height * HOPPER_HEIGHT_FRACTION).max(MIN_EXTENT);
        let hopper = Hopper {
            top: hopper_top,
            bottom: hopper_bottom,
            top_half_width: (content_width * 0.25).max(peg_spacing),
            neck_half_width: peg_spacing * 0.5,
        };

        let emit_y = hopper_bottom;
        let board_top = emit_y + row_spacing;
        let board_bottom = board_top + board_height;

        let acc_top = board_bottom + row_spacing;
        let acc_bottom = (height - margin).max(acc_top + MIN_EXTENT);
        let half_width = (rows / 2.0 + 0.5) * peg_spacing;
        let accumulation = Accumulation {
            top: acc_top,
            bottom: acc_bottom,
            left: center_x - half_width,
            right: center_x + half_width,
        };

        let stack_row_h = stack_row_height(accumulation.height(), peg_spacing, num_rows, total_particles);

        let geom = BoardGeom {
            emit_x: center_x,
            emit_y,
            center_x,
            board_top,
            board_bottom,
            peg_spacing,
            num_rows,
            acc_bottom,
            left: accumulation.left,
            right: accumulation.right,
        };

        Self {
            viewport,
            total_particles,
            margin,
            content_width,
            row_spacing,
            hopper,
            accumulation,
            stack_row_h,
            geom,
        }
    }

    /// Engine-facing view of this layout
    pub fn board_geom(&self) -> BoardGeom {
        self.geom
    }

    pub fn num_rows(&self) -> u32 {
        self.geom.num_rows
    }

    pub fn peg_spacing(&self) -> f32 {
        self.geom.peg_spacing
    }

    /// All peg centres, row by row
    pub fn pegs(&self) -> Vec<Vec2> {
        let g = &self.geom;
        (0..g.num_rows)
            .flat_map(|row| (0..=row).map(move |i| Vec2::new(g.peg_x(row, i), g.peg_y(row))))
            .collect()
    }
}

/// Layer height so the tallest expected stack fits the accumulation area
fn stack_row_height(available: f32, peg_spacing: f32, num_rows: u32, total_particles: u32) -> f32 {
    let expected_peak = max_bin_probability(num_rows) * f64::from(total_particles);
    let peak = (expected_peak as f32 * STACK_SAFETY).max(1.0);
    let h = available.max(MIN_EXTENT) * STACK_FILL / peak;
    finite_or(h, MIN_STACK_ROW_H).min(peg_spacing).max(MIN_STACK_ROW_H)
}

/// Probability of the central bin of binomial(`n`, 0.5)
pub fn max_bin_probability(n: u32) -> f64 {
    bin_probability(n, n / 2)
}

/// Binomial(`n`, 0.5) probability of bin `k`
pub fn bin_probability(n: u32, k: u32) -> f64 {
    if k > n {
        return 0.0;
    }
    // C(n, k) stays below 2^63 for n <= 64, well inside f64 range
    let k = k.min(n - k);
    let mut c = 1.0f64;
    for i in 1..=k {
        c *= f64::from(n - k + i) / f64::from(i);
    }
    c / 2f64.powi(n as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout(rows: u32, particles: u32) -> Layout {
        Layout::compute(Viewport::new(800.0, 1000.0), rows, particles)
    }

    #[test]
    fn test_max_bin_probability() {
        assert!((max_bin_probability(0) - 1.0).abs() < 1e-12);
        assert!((max_bin_probability(1) - 0.5).abs() < 1e-12);
        assert!((max_bin_probability(2) - 0.5).abs() < 1e-12);
        assert!((max_bin_probability(10) - 252.0 / 1024.0).abs() < 1e-12);
        let p64 = max_bin_probability(64);
        assert!(p64 > 0.09 && p64 < 0.1);
    }

    #[test]
    fn test_bin_probabilities_sum_to_one() {
        for n in [1, 4, 10, 33, 64] {
            let total: f64 = (0..=n).map(|k| bin_probability(n, k)).sum();
            assert!((total - 1.0).abs() < 1e-9, "n = {n}: {total}");
        }
    }

    #[test]
    fn test_peg_lattice_is_triangular() {
        let l = layout(10, 1000);
        let g = l.board_geom();
        // Row 0 has a single centred peg
        assert!((g.peg_x(0, 0) - g.center_x).abs() < 1e-4);
        // Row r spans r * spacing, centred
        let left = g.peg_x(9, 0);
        let right = g.peg_x(9, 9);
        assert!((right - left - 9.0 * g.peg_spacing).abs() < 1e-3);
        assert!(((left + right) / 2.0 - g.center_x).abs() < 1e-3);
        // Rows evenly spaced from top to bottom
        assert!((g.peg_y(0) - g.board_top).abs() < 1e-4);
        assert!((g.peg_y(9) - g.board_bottom).abs() < 1e-3);
        assert_eq!(l.pegs().len(), 55);
    }

    #[test]
    fn test_out_of_range_queries_clamp() {
        let g = layout(10, 1000).board_geom();
        assert_eq!(g.peg_y(50), g.peg_y(9));
        assert_eq!(g.peg_x(3, 10), g.peg_x(3, 3));
        assert_eq!(g.bin_x(99), g.bin_x(10));
        assert_eq!(g.nearest_bin(-1.0e6), 0);
        assert_eq!(g.nearest_bin(1.0e6), 10);
        assert_eq!(g.nearest_bin(f32::NAN), 0);
    }

    #[test]
    fn test_nearest_bin_round_trips_bin_x() {
        let g = layout(12, 500).board_geom();
        for b in 0..=12 {
            assert_eq!(g.nearest_bin(g.bin_x(b)), b);
        }
    }

    #[test]
    fn test_spacing_width_limited_for_many_rows() {
        let l = Layout::compute(Viewport::new(400.0, 2000.0), 64, 3600);
        let width_spacing = l.content_width / 66.0;
        assert!((l.peg_spacing() - width_spacing).abs() < 1e-4);
    }

    #[test]
    fn test_spacing_aspect_limited_for_wide_viewport() {
        let l = Layout::compute(Viewport::new(4000.0, 600.0), 20, 500);
        assert!(l.peg_spacing() < l.content_width / 22.0);
        let board_h = l.geom.board_bottom - l.geom.board_top;
        assert!((board_h - 600.0 * BOARD_HEIGHT_FRACTION).abs() < 0.5);
    }

    #[test]
    fn test_single_row_collapses_board() {
        for rows in [0, 1] {
            let l = layout(rows, 100);
            assert_eq!(l.geom.board_top, l.geom.board_bottom);
            assert!(l.peg_spacing().is_finite());
            assert!(l.stack_row_h > 0.0);
        }
    }

    #[test]
    fn test_tallest_expected_stack_fits() {
        for (rows, particles) in [(4, 10), (10, 1000), (24, 1200), (64, 3600), (4, 3600)] {
            let l = layout(rows, particles);
            let peak = max_bin_probability(rows) * f64::from(particles) * 1.15;
            let stack = peak as f32 * l.stack_row_h;
            assert!(stack <= l.accumulation.height() + 1e-3, "rows {rows} particles {particles}");
        }
    }

    #[test]
    fn test_stack_row_shrinks_with_more_particles() {
        let small = layout(10, 100).stack_row_h;
        let large = layout(10, 3000).stack_row_h;
        assert!(large < small);
    }

    #[test]
    fn test_degenerate_viewport_is_finite() {
        for (w, h) in [(0.0, 0.0), (0.001, 500.0), (500.0, 0.001), (f32::NAN, 10.0), (-5.0, -5.0)] {
            let l = Layout::compute(Viewport::new(w, h), 10, 100);
            let g = l.board_geom();
            for v in [
                g.emit_x,
                g.emit_y,
                g.board_top,
                g.board_bottom,
                g.peg_spacing,
                g.acc_bottom,
                l.stack_row_h,
                l.accumulation.top,
            ] {
                assert!(v.is_finite(), "{w}x{h}");
            }
            assert!(g.peg_spacing > 0.0);
            assert!(l.accumulation.bottom > l.accumulation.top);
        }
    }

    proptest! {
        #[test]
        fn prop_layout_finite_and_ordered(
            w in 0.0f32..5000.0,
            h in 0.0f32..5000.0,
            rows in 0u32..=64,
            particles in 1u32..=3600,
        ) {
            let l = Layout::compute(Viewport::new(w, h), rows, particles);
            let g = l.board_geom();
            prop_assert!(g.peg_spacing.is_finite() && g.peg_spacing > 0.0);
            prop_assert!(l.stack_row_h.is_finite() && l.stack_row_h > 0.0);
            prop_assert!(g.emit_y < g.board_top);
            prop_assert!(g.board_top <= g.board_bottom);
            prop_assert!(g.board_bottom < l.accumulation.top);
            prop_assert!(l.accumulation.top < l.accumulation.bottom);
            prop_assert!(g.left < g.right);
        }
    }
}
