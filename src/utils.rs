//! Implementer-debugging trace macro.
//!
//! Grounded on html5gum's own `trace_log!` (same file, same reasoning: a macro
//! rather than a function so that the `format!` call and its allocation are compiled
//! out entirely when the feature is off, instead of merely skipped at runtime).
//! Renamed `trace!` and regated onto this crate's `trace-log` Cargo feature rather
//! than html5gum's `integration-tests` feature, since here it is meant for anyone
//! debugging a parse, not only the test harness.

macro_rules! trace {
    ($($tt:tt)*) => {{
        #[cfg(feature = "trace-log")]
        eprintln!($($tt)*);
    }};
}

pub(crate) use trace;
