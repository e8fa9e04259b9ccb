//! ConvFlow: cycle-level modeling of latency-insensitive stream pipelines.
//!
//! A design is a composition of [`Module`]s connected by channels. Each module is a Mealy machine whose
//! combinational part ([`Module::comb`]) is a pure function of its registers and inputs, and whose sequential
//! part ([`Module::tick`]) latches the next registers at the clock edge.

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

mod channel;
mod error;
mod module;
pub mod sim;

pub use channel::*;
pub use error::*;
pub use module::*;
pub use sim::Testbench;
