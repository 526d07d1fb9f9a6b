//! Build script for the Skinalyze desktop shell.
//!
//! Only the `desktop` feature needs Tauri code generation; the core library
//! builds without it.

fn main() {
    #[cfg(feature = "desktop")]
    tauri_build::build();
}
