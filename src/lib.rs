pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod news;
pub mod retry;
pub mod speech;
pub mod storage;
pub mod summarize;

pub use config::Config;
pub use error::{Error, Result};
