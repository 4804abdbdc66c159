//! GATT server database for the Bluetooth Test Protocol (BTP) tester.
//!
//! The tester builds a server-side attribute database from BTP commands sent
//! by an external test harness, publishes it through the host stack, enforces
//! per-attribute read/write policy, and drives the characteristic discovery
//! needed to subscribe to notifications and indications on a peer.
//!
//! The host stack itself (connections, security, ATT bearer) is an external
//! collaborator reached through the [`host::Host`] trait.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub use config::*;

pub mod att;
pub mod btp;
pub mod gap;
pub mod gatt;
pub mod host;
pub mod le;

mod config;
mod util;
