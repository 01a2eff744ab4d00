#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
#[cfg(feature = "async-tokio")]
mod futures;
mod generator;
mod layout;
mod time;

pub use crate::error::*;
#[cfg(feature = "async-tokio")]
pub use crate::futures::*;
pub use crate::generator::*;
pub use crate::layout::*;
pub use crate::time::*;
