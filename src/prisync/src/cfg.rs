//! Static configuration
//!
//! Priorities are plain integers. A larger value means a higher priority.

/// The lowest priority.
pub const PRI_MIN: usize = 0;

/// The priority assigned to a thread when nothing else is specified.
pub const PRI_DEFAULT: usize = 31;

/// The highest priority.
pub const PRI_MAX: usize = 63;

/// The default value of [`KernelCfg::DONATION_DEPTH_LIMIT`].
///
/// [`KernelCfg::DONATION_DEPTH_LIMIT`]: crate::KernelCfg::DONATION_DEPTH_LIMIT
pub const DEFAULT_DONATION_DEPTH_LIMIT: usize = 8;

/// Return `true` if `priority` is in the range `PRI_MIN..=PRI_MAX`.
#[inline]
pub const fn is_valid_priority(priority: usize) -> bool {
    // `PRI_MIN` is zero
    priority <= PRI_MAX
}
