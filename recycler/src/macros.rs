#[cfg(feature = "tracing")]
macro_rules! rtrace {
    ($($tt:tt)*) => {
        tracing::trace!(target: "recycler", $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! rtrace {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! rdebug {
    ($($tt:tt)*) => {
        tracing::debug!(target: "recycler", $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! rdebug {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! rwarn {
    ($($tt:tt)*) => {
        tracing::warn!(target: "recycler", $($tt)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! rwarn {
    ($($tt:tt)*) => {};
}

/// Reports a caller protocol violation: asserts in debug builds, logs and carries on in release.
macro_rules! inconsistent {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            rwarn!($($msg)+);
            debug_assert!($cond, $($msg)+);
        }
    };
}
