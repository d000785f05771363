//! Deterministic fill patterns for freshly acquired buffers.

use bytemuck::Pod;
use num_traits::AsPrimitive;

/// Smallest value of the ramp written into non-zeroed buffers.
pub const RAMP_MIN: i32 = -23;
/// Largest value of the ramp; the pattern wraps back to [`RAMP_MIN`] after it.
pub const RAMP_MAX: i32 = 23;

/// Plain numeric element that can live in a guarded buffer.
///
/// Values are produced by an `as` conversion from `i32`, so the same ramp
/// works for floats and for wrapping integer types alike.
pub trait GuardElement: Pod + Send + 'static {
    fn from_ramp(value: i32) -> Self;
}

impl<T> GuardElement for T
where
    T: Pod + Send + 'static,
    i32: AsPrimitive<T>,
{
    #[inline]
    fn from_ramp(value: i32) -> Self {
        value.as_()
    }
}

pub fn fill_zero<T: GuardElement>(slice: &mut [T]) {
    slice.fill(T::from_ramp(0));
}

/// Writes `-23, -22, ..., 23, -23, ...` from the start of `slice`.
pub fn fill_ramp<T: GuardElement>(slice: &mut [T]) {
    for (slot, value) in slice.iter_mut().zip((RAMP_MIN..=RAMP_MAX).cycle()) {
        *slot = T::from_ramp(value);
    }
}
