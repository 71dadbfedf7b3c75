//! HTTP surface.
//!
//! Each module exposes `open_routes()` and `gated_routes()`; the application
//! router in [`crate::app`] wraps the gated set with the MFA gate before
//! merging. Wire field names follow the dashboard client (`qrCodeURL`,
//! `boxNo`, `newTotal`, ...).

pub mod admin;
pub mod device;
