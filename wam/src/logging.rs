//! Logging macros which forward to [log](https://docs.rs/log) when the `logging` feature is enabled.
//!
//! With logging disabled the arguments are still borrowed, so values only used for logging don't
//! trigger unused warnings.

#[macro_export]
macro_rules! log_error {
    ($($arg:expr),*) => {{
        $(let _ = &$arg;)*

        #[cfg(feature = "logging")]
        ::log::error!(target: "wam", $($arg),*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:expr),*) => {{
        $(let _ = &$arg;)*

        #[cfg(feature = "logging")]
        ::log::warn!(target: "wam", $($arg),*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:expr),*) => {{
        $(let _ = &$arg;)*

        #[cfg(feature = "logging")]
        ::log::info!(target: "wam", $($arg),*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:expr),*) => {{
        $(let _ = &$arg;)*

        #[cfg(feature = "logging")]
        ::log::debug!(target: "wam", $($arg),*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:expr),*) => {{
        $(let _ = &$arg;)*

        #[cfg(feature = "logging")]
        ::log::trace!(target: "wam", $($arg),*);
    }};
}
