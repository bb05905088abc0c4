// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::cast_precision_loss,      // Acceptable for jitter math
    clippy::missing_errors_doc,       // Internal API
    clippy::module_name_repetitions   // e.g. InputError in input module
)]

pub mod app;
pub mod buffer;
pub mod event;
pub mod forwarder;
pub mod input;
pub mod sender;

// Re-export main types for easy access
pub use app::{App, Config};
pub use forwarder::{Forwarder, ForwarderSettings, Liveness};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
