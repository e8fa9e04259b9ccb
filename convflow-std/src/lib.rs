//! Standard library of stream stages.

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

pub mod adapter;
pub mod fifo;
pub mod uart;
mod watchdog;

pub use adapter::{Adapter, Direction, Word};
pub use fifo::{Fifo, Queue};
pub use uart::{Parity, RxErrors, StopBits, UartConfig, UartRx, UartTx};
pub use watchdog::Watchdog;
