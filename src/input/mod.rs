pub mod framer;
pub mod tail;

pub use framer::LineFramer;
pub use tail::{InputSource, spawn_reader};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to open input {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("input read failed: {0}")]
    Read(#[from] std::io::Error),
}
