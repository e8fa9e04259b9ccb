//! Host side of the convolution accelerator.
//!
//! [`Accelerator`] checks kernels and images, frames jobs, and collects the results over any [`Link`]: a real
//! byte device ([`IoLink`]) or a simulated one ([`SimLink`]).

// # Tries to deny all lints (`rustc -W help`).
#![deny(absolute_paths_not_starting_with_crate)]
#![deny(anonymous_parameters)]
#![deny(deprecated_in_future)]
#![deny(explicit_outlives_requirements)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(missing_debug_implementations)]
#![deny(non_ascii_idents)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_extern_crates)]
#![deny(unused_import_braces)]
//
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_html_tags)]
#![deny(rustdoc::bare_urls)]
//
#![allow(clippy::type_complexity)]
#![allow(elided_lifetimes_in_paths)]

mod accelerator;
mod error;
mod image;
mod kernel;
mod link;

pub use accelerator::{Accelerator, HostConfig, HostStats};
pub use convflow_accel::golden;
pub use error::{Error, Result, ShapeError};
pub use image::{FilterOutput, Image};
pub use kernel::{Kernel, Preset};
pub use link::{Fault, IoLink, Link, SerialPhy, SimLink, SimLinkConfig};
