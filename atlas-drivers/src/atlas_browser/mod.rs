pub mod driver;
pub mod launch;
pub mod session;

pub use driver::{AtlasDriver, ChromeLauncher};
pub use launch::LaunchProfile;
pub use session::{BrowserLauncher, BrowserSession, Key};
