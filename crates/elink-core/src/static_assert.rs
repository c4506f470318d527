//! Compile-time static assertion macro.

/// Asserts a condition at compile time.
///
/// Used to pin descriptor layouts and ring geometry that the hardware
/// depends on.
#[macro_export]
macro_rules! static_assert {
    ($cond:expr $(,)?) => {
        const _: () = assert!($cond);
    };
    ($cond:expr, $msg:expr $(,)?) => {
        const _: () = assert!($cond, $msg);
    };
}
