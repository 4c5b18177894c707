//! Pure progress arithmetic.
//!
//! Nothing in here touches shared state. Two curves are provided:
//!
//! * **Determinate:** `completed / total`, clamped to `[0, 1]`.
//! * **Logarithmic:** a saturating curve `n / (n + scale)` for work whose size is
//!   unknown. It rises quickly, flattens out, and never reaches `1` on its own; only
//!   closing an indicator paints it as complete.

use std::time::Duration;

/// Scale used when an indicator of unknown size does not specify one.
///
/// With the default, 10 items show as 50%, 90 items as 90%.
pub const DEFAULT_LOG_SCALE: f64 = 10.0;

/// Largest value the logarithmic curve reports.
const LOG_CEILING: f64 = 1.0 - f64::EPSILON;

/// Fraction of work done against a known total.
///
/// A total of zero counts as already complete.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn determinate_fraction(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (completed as f64 / total as f64).clamp(0.0, 1.0)
}

/// Estimated fraction of work done when the total is unknown.
///
/// Always below `1` and never decreasing in `completed`. It is strictly increasing as
/// long as one more item moves the curve by more than the spacing of `f64` just below
/// `1`, which holds up to roughly `9e7 * sqrt(scale)` items (about `3e8` at the
/// default scale). Past that point the curve plateaus a few ulps below `1`.
///
/// Evaluated as `1 - scale / (n + scale)`: each step of that form is a correctly
/// rounded monotone operation, so rounding can never make the curve step backwards.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn logarithmic_fraction(completed: u64, scale: f64) -> f64 {
    let scale = sanitize_scale(scale).unwrap_or(DEFAULT_LOG_SCALE);
    let n = completed as f64;
    (1.0 - scale / (n + scale)).min(LOG_CEILING)
}

/// Returns the scale if it can drive the logarithmic curve.
#[must_use]
pub fn sanitize_scale(scale: f64) -> Option<f64> {
    (scale.is_finite() && scale > 0.0).then_some(scale)
}

/// Average items per second over `elapsed`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn throughput(completed: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        completed as f64 / secs
    } else {
        0.0
    }
}

/// Estimates the time remaining from the average rate since start.
///
/// Returns `None` if nothing has been done yet, the total is zero, or the elapsed
/// time is too small to yield a meaningful rate.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn eta(completed: u64, total: u64, elapsed: Duration) -> Option<Duration> {
    if completed == 0 || total == 0 {
        return None;
    }

    let secs = elapsed.as_secs_f64();
    if secs <= 1e-6 {
        return None;
    }

    let rate = completed as f64 / secs;
    let remaining = total.saturating_sub(completed) as f64;

    Duration::try_from_secs_f64(remaining / rate).ok()
}
