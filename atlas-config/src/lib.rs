//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: built-in defaults, config files, inline YAML,
//! then `ATLAS_`-prefixed environment variables (`__` separates nesting, so
//! `ATLAS_CRAWLER__MAX_PAGES=10` sets `crawler.max_pages`). After merging,
//! `${VAR}` placeholders in string values are expanded, and a handful of
//! well-known variables (`IDEALIST_MAX_PAGES`, `HEADLESS`, `GEMINI_API_KEY`,
//! `GEMINI_FAST_MODEL`) are applied on top.
use atlas_common::{AtlasConfig, LlmSettings};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

fn env_flag_disabled(raw: &str) -> bool {
    matches!(raw.trim(), "0" | "false" | "False" | "no" | "NO")
}

/// Apply the plain environment variables the crawler and generator honour
/// outside the `ATLAS_` namespace.
fn apply_env_shortcuts(cfg: &mut AtlasConfig) {
    if let Some(pages) = std::env::var("IDEALIST_MAX_PAGES")
        .ok()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
    {
        cfg.crawler.max_pages = pages;
    }

    if let Ok(raw) = std::env::var("HEADLESS") {
        cfg.browser.headless = !env_flag_disabled(&raw);
    }

    if let LlmSettings::Gemini { api_key, model, .. } = &mut cfg.llm {
        if api_key.as_deref().map_or(true, |k| k.trim().is_empty() || k.contains('$')) {
            *api_key = std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        if let Ok(fast) = std::env::var("GEMINI_FAST_MODEL") {
            if !fast.trim().is_empty() {
                *model = fast.trim().to_string();
            }
        }
    }
}

/// Builder hides the `config` crate wiring (files + YAML + env overrides).
pub struct AtlasConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for AtlasConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AtlasConfigLoader {
    /// Start with defaults; `ATLAS_` env overrides are attached at [`load`](Self::load).
    ///
    /// ```
    /// use atlas_config::AtlasConfigLoader;
    ///
    /// let config = AtlasConfigLoader::new()
    ///     .with_yaml_str("version: '1'\ncrawler:\n  max_pages: 7")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.crawler.page_param, "page");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "ATLAS",
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; the format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when absent, so deployments can rely
    /// purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use atlas_common::LlmSettings;
    /// use atlas_config::AtlasConfigLoader;
    ///
    /// let cfg = AtlasConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// store:
    ///   path: "/tmp/archive.json"
    /// llm:
    ///   provider: "none"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.store.path.to_str(), Some("/tmp/archive.json"));
    /// assert!(matches!(cfg.llm, LlmSettings::None));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self.builder.add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into [`AtlasConfig`].
    pub fn load(self) -> Result<AtlasConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let mut typed: AtlasConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        apply_env_shortcuts(&mut typed);

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("ATLAS_TEST_FOO", Some("bar"), || {
            let mut v = json!("prefix-${ATLAS_TEST_FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars(
            [("ATLAS_TEST_CITY", Some("Nairobi")), ("ATLAS_TEST_NATION", Some("KE"))],
            || {
                let mut v = json!([
                    "hello-$ATLAS_TEST_CITY",
                    { "loc": "${ATLAS_TEST_CITY}-${ATLAS_TEST_NATION}" },
                    42,
                    true,
                    null
                ]);
                expand_env_in_value(&mut v);
                assert_eq!(
                    v,
                    json!(["hello-Nairobi", { "loc": "Nairobi-KE" }, 42, true, null])
                );
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars(
            [("ATLAS_TEST_A", Some("${ATLAS_TEST_B}")), ("ATLAS_TEST_B", Some("${ATLAS_TEST_A}"))],
            || {
                let mut v = json!("x=${ATLAS_TEST_A}-y");
                expand_env_in_value(&mut v);
                let s = v.as_str().unwrap();
                assert!(s.starts_with("x=") && s.ends_with("-y"));
                assert!(s.contains("${"));
            },
        );
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${ATLAS_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${ATLAS_DOES_NOT_EXIST}"));
    }

    #[test]
    fn headless_flag_parsing() {
        assert!(env_flag_disabled("0"));
        assert!(env_flag_disabled(" no "));
        assert!(env_flag_disabled("False"));
        assert!(!env_flag_disabled("1"));
        assert!(!env_flag_disabled("yes"));
    }
}
