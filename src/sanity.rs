//! Debug-only invariant checks, elided entirely in release builds.

/// Panics with `msg` when `cond` is false and `debug_assertions` are enabled.
/// A no-op in release builds.
#[macro_export]
macro_rules! sanity_check {
    ($cond:expr, $($msg:tt)*) => {
        if cfg!(debug_assertions) && !$cond {
            panic!($($msg)*);
        }
    };
}
