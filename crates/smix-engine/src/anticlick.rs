//! Click suppression for abrupt level changes.
//!
//! Every voice remembers its contribution to the last frame it rendered (its
//! residual). When the voice's gain changes, or it stops, the part of that
//! contribution that would vanish instantly is handed to a short linear ramp
//! instead of dropping to the new level in a single frame.

use crate::fixed::PAN_CENTER;

/// Longest fade, in frames, used to ramp a residual to zero.
pub const FADE_FRAMES: usize = 16;

/// A voice's (or the mixer's) contribution still to be faded out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Residual {
    /// Channel 0 contribution (also the only one in mono)
    pub right: i32,
    /// Channel 1 contribution
    pub left: i32,
}

impl Residual {
    pub fn is_silent(&self) -> bool {
        self.right == 0 && self.left == 0
    }

    /// Keep only the part of the residual that disappears when the voice's
    /// level changes from `(old_vol, old_pan)` to `(new_vol, new_pan)`.
    ///
    /// Nothing is folded when the old volume is 0. The divide happens before
    /// the multiply, so small residuals keep their full value.
    pub fn fold(&mut self, old_vol: u8, old_pan: i8, new_vol: u8, new_pan: i8) {
        if old_vol == 0 {
            return;
        }
        let (old_vol, new_vol) = (i32::from(old_vol), i32::from(new_vol));
        let (old_pan, new_pan) = (i32::from(old_pan), i32::from(new_pan));

        let old_r = old_vol * (PAN_CENTER - old_pan);
        let new_r = new_vol * (PAN_CENTER - new_pan);
        let old_l = old_vol * (PAN_CENTER + old_pan);
        let new_l = new_vol * (PAN_CENTER + new_pan);

        self.right = self.right.wrapping_sub(scaled(self.right, old_r, new_r));
        self.left = self.left.wrapping_sub(scaled(self.left, old_l, new_l));
    }

    /// Add another residual into this one.
    pub fn absorb(&mut self, other: Residual) {
        self.right = self.right.wrapping_add(other.right);
        self.left = self.left.wrapping_add(other.left);
    }
}

/// `value / old * new`, treating a zero divisor as a zero quotient.
fn scaled(value: i32, old: i32, new: i32) -> i32 {
    value.checked_div(old).unwrap_or(0).wrapping_mul(new)
}

/// Ramp `residual` linearly to zero over at most `frames` frames.
///
/// `out` holds interleaved frames of `stride` samples starting at the first
/// frame to fade into; the ramp is cut short at the end of `out`. Channel 1 is
/// only written when `stride > 1`.
pub fn ramp_down(residual: Residual, out: &mut [i32], stride: usize, frames: usize) {
    let stride = stride.max(1);
    let frames = frames.min(out.len() / stride);
    if frames == 0 || residual.is_silent() {
        return;
    }

    let (mut right, mut left) = (residual.right, residual.left);
    let dec_r = right / frames as i32;
    let dec_l = left / frames as i32;

    for frame in out.chunks_exact_mut(stride).take(frames) {
        if right == 0 && left == 0 {
            break;
        }
        right = step_toward_zero(right, dec_r);
        frame[0] = frame[0].wrapping_add(right);
        left = step_toward_zero(left, dec_l);
        if stride > 1 {
            frame[1] = frame[1].wrapping_add(left);
        }
    }
}

/// One ramp step. Positive steps only ever lower the value and negative steps
/// only ever raise it; overshooting lands on zero.
fn step_toward_zero(value: i32, dec: i32) -> i32 {
    if dec > 0 {
        if value > dec {
            value - dec
        } else {
            0
        }
    } else if value < dec {
        value - dec
    } else {
        0
    }
}
