//! Shared utilities used across every `robco-*` crate.
//!
//! By default, this crate only enables modules which do not have any crate dependencies (aside from
//! snafu, which is required for errors).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
#[allow(unused_imports)]
mod no_std {
    extern crate alloc;
    pub use alloc::boxed::Box;
    pub use alloc::format;
    pub use alloc::string::String;
}

pub mod prelude;

// Enable any crates that don't have dependencies by default
pub mod data;
pub mod util;
pub use util::format_size;

#[cfg(feature = "time")]
pub mod time;

