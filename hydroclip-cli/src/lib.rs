//! Library target for the `hydroclip` package.
//!
//! The primary deliverable of this package is the `hydroclip` CLI binary
//! (`src/main.rs`). This library exists so CI can run `cargo test -p hydroclip --doc`.

#[doc(hidden)]
pub use hydroclip_engine;
