#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod checkpoint;
mod error;
mod flusher;
mod generator;
mod id;
mod rand;
mod service;
mod time;
mod worker;

pub use crate::checkpoint::*;
pub use crate::error::*;
pub use crate::flusher::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::rand::*;
pub use crate::service::*;
pub use crate::time::*;
pub use crate::worker::*;
