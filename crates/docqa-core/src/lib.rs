#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod align;
pub mod chunker;
pub mod config;
pub mod dataset;
pub mod error;
pub mod sections;
pub mod similarity;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
