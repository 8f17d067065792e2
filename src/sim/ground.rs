//! Accumulated pile surface
//!
//! The ground under each bin rises one layer per settled particle, so later
//! particles land on top of earlier ones.

use super::layout::{BoardGeom, Layout};

/// Pile surface height as a pure function of the current bin counts
pub trait Ground {
    fn ground_y(&self, x: f32, bin_counts: &[u32]) -> f32;
}

/// Surface over the nearest bin centre: `acc_bottom - count * stack_row_h`
pub fn stack_ground_y(geom: &BoardGeom, stack_row_h: f32, bin_counts: &[u32], x: f32) -> f32 {
    let bin = geom.nearest_bin(x) as usize;
    let count = bin_counts.get(bin).copied().unwrap_or(0);
    geom.acc_bottom - count as f32 * stack_row_h
}

impl Ground for Layout {
    fn ground_y(&self, x: f32, bin_counts: &[u32]) -> f32 {
        stack_ground_y(&self.geom, self.stack_row_h, bin_counts, x)
    }
}

/// Level floor that ignores the pile
#[derive(Debug, Clone, Copy)]
pub struct FlatGround(pub f32);

impl Ground for FlatGround {
    fn ground_y(&self, _x: f32, _bin_counts: &[u32]) -> f32 {
        self.0
    }
}

/// Adapter for an arbitrary surface function
pub struct FnGround<F>(pub F);

impl<F: Fn(f32, &[u32]) -> f32> Ground for FnGround<F> {
    fn ground_y(&self, x: f32, bin_counts: &[u32]) -> f32 {
        (self.0)(x, bin_counts)
    }
}
