//! Logging interface, contingent on the hidden `__log` feature or the
//! `defmt-03` feature
//!
//! Only enable `__log` when debugging, and when you're certain that your
//! logger isn't using USB!

macro_rules! debug {
    ($($args:tt)*) => {{
        #[cfg(feature = "__log")]
        ::__log::debug!($($args)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::debug!($($args)*);
    }};
}

macro_rules! warn {
    ($($args:tt)*) => {{
        #[cfg(feature = "__log")]
        ::__log::warn!($($args)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::warn!($($args)*);
    }};
}

macro_rules! trace {
    ($($args:tt)*) => {{
        #[cfg(feature = "__log")]
        ::__log::trace!($($args)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::trace!($($args)*);
    }};
}
