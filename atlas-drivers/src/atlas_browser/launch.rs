use atlas_common::BrowserSettings;
use serde_json::{json, Map, Value};
use webdriver::capabilities::Capabilities;

/// Chrome startup variants, tried in order until one connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchProfile {
    /// `--headless=new` with the full flag set.
    ModernHeadless,
    /// Classic `--headless` for older Chrome builds.
    LegacyHeadless,
    /// Visible window with the full flag set.
    Standard,
    /// Visible window, only window size, user agent and prefs.
    Minimal,
}

impl LaunchProfile {
    /// Profiles to attempt for the requested headless mode.
    pub fn ordered(headless: bool) -> Vec<Self> {
        if headless {
            vec![Self::ModernHeadless, Self::LegacyHeadless, Self::Minimal]
        } else {
            vec![Self::Standard, Self::Minimal]
        }
    }
}

/// Construct Chrome command‑line arguments for a profile on the given OS
/// (`std::env::consts::OS`).
pub fn build_chrome_arguments(
    profile: LaunchProfile,
    settings: &BrowserSettings,
    os: &str,
) -> Vec<String> {
    let mut args = Vec::new();
    match profile {
        LaunchProfile::ModernHeadless => args.push("--headless=new".to_string()),
        LaunchProfile::LegacyHeadless => args.push("--headless".to_string()),
        LaunchProfile::Standard | LaunchProfile::Minimal => {}
    }

    if profile != LaunchProfile::Minimal {
        args.extend(
            [
                "--disable-extensions",
                "--disable-plugins-discovery",
                "--disable-software-rasterizer",
                "--disable-background-timer-throttling",
                "--disable-backgrounding-occluded-windows",
                "--disable-renderer-backgrounding",
                "--disable-component-extensions-with-background-pages",
            ]
            .map(String::from),
        );
    }

    args.push(format!(
        "--window-size={},{}",
        settings.window_size.0, settings.window_size.1
    ));
    args.push(format!("--user-agent={}", settings.user_agent));

    // Container flags crash Chrome on Windows/macOS.
    if os == "linux" && profile != LaunchProfile::Minimal {
        args.push("--no-sandbox".to_string());
        args.push("--disable-dev-shm-usage".to_string());
    }
    args
}

/// WebDriver capabilities for a profile.
pub fn build_capabilities(
    profile: LaunchProfile,
    settings: &BrowserSettings,
    os: &str,
) -> Capabilities {
    let mut chrome_opts = Map::new();
    chrome_opts.insert(
        "args".to_string(),
        json!(build_chrome_arguments(profile, settings, os)),
    );
    if settings.block_images {
        chrome_opts.insert(
            "prefs".to_string(),
            json!({ "profile.managed_default_content_settings.images": 2 }),
        );
    }

    let mut caps = Capabilities::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("pageLoadStrategy".to_string(), json!("eager"));
    caps.insert("goog:chromeOptions".to_string(), Value::Object(chrome_opts));
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_tries_modern_then_legacy_then_minimal() {
        assert_eq!(
            LaunchProfile::ordered(true),
            vec![
                LaunchProfile::ModernHeadless,
                LaunchProfile::LegacyHeadless,
                LaunchProfile::Minimal
            ]
        );
        assert_eq!(
            LaunchProfile::ordered(false),
            vec![LaunchProfile::Standard, LaunchProfile::Minimal]
        );
    }

    #[test]
    fn linux_only_flags_are_gated_on_os() {
        let settings = BrowserSettings::default();
        let linux = build_chrome_arguments(LaunchProfile::ModernHeadless, &settings, "linux");
        let mac = build_chrome_arguments(LaunchProfile::ModernHeadless, &settings, "macos");
        assert!(linux.contains(&"--no-sandbox".to_string()));
        assert!(!mac.contains(&"--no-sandbox".to_string()));
        assert_eq!(linux[0], "--headless=new");
        assert!(linux.contains(&"--window-size=1400,900".to_string()));
    }

    #[test]
    fn minimal_profile_keeps_only_essentials() {
        let settings = BrowserSettings::default();
        let args = build_chrome_arguments(LaunchProfile::Minimal, &settings, "linux");
        assert_eq!(args.len(), 2);
        assert!(args[1].starts_with("--user-agent="));
    }

    #[test]
    fn capabilities_block_images_and_load_eagerly() {
        let settings = BrowserSettings::default();
        let caps = build_capabilities(LaunchProfile::LegacyHeadless, &settings, "linux");
        assert_eq!(caps["pageLoadStrategy"], json!("eager"));
        assert_eq!(
            caps["goog:chromeOptions"]["prefs"]["profile.managed_default_content_settings.images"],
            json!(2)
        );
        assert_eq!(caps["goog:chromeOptions"]["args"][0], json!("--headless"));

        let no_block = BrowserSettings {
            block_images: false,
            ..BrowserSettings::default()
        };
        let caps = build_capabilities(LaunchProfile::Standard, &no_block, "linux");
        assert!(caps["goog:chromeOptions"].get("prefs").is_none());
    }
}
