#![doc = include_str!("../README.md")]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate lazy_static;

pub mod archive;
pub mod catalog;
pub mod command;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod lock;
pub mod prelude;
pub mod stream;
pub mod supervisor;
pub mod xlog;

pub use error::Error;
