//! Driver layer for browser automation.
//!
//! This crate exposes the browser session abstraction the listing crawler
//! is written against, and a Chromedriver implementation of it.
//!
//! - [`atlas_browser::session::BrowserSession`]: selector-addressed page capabilities
//! - [`atlas_browser::session::BrowserLauncher`]: starts sessions
//! - [`atlas_browser::driver::ChromeLauncher`]: WebDriver client wrapper with profile fallback
//! - [`atlas_browser::launch`]: Chrome launch profiles and capabilities
pub mod atlas_browser;

pub use atlas_browser::{BrowserLauncher, BrowserSession, ChromeLauncher, Key};
