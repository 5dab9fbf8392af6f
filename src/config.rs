use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Project settings already resolved from the legacy JavaScript config.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Config {
    /// Globs selecting template, markup and script files.
    #[serde(default)]
    pub content: Vec<String>,
    /// Entry stylesheets. Empty means every `**/*.css` file in the project.
    #[serde(default)]
    pub stylesheets: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Path of the legacy config file, relative to the project root.
    #[serde(default)]
    pub legacy_config: Option<String>,
    #[serde(default)]
    pub theme: toml::Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|err| ConfigError {
        message: format!("failed to read config {}: {}", path.display(), err),
    })?;
    parse(&text).map_err(|err| ConfigError {
        message: format!("failed to parse config {}: {}", path.display(), err.message),
    })
}

pub fn parse(text: &str) -> Result<Config, ConfigError> {
    toml::from_str(text).map_err(|err| ConfigError {
        message: err.to_string(),
    })
}

impl Config {
    /// The theme table flattened to `(dotted.key.path, value)` pairs.
    pub fn theme_entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        flatten_table(&self.theme, "", &mut entries);
        entries
    }
}

fn flatten_table(table: &toml::Table, prefix: &str, out: &mut Vec<(String, String)>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten_table(nested, &path, out),
            other => out.push((path, render_value(other))),
        }
    }
}

fn render_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, load, parse};
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn loads_toml_config() {
        let path = temp_path("upgrade_config");
        let _ = fs::write(
            &path,
            "content = [\"./src/**/*.{html,js}\"]\nstylesheets = [\"src/input.css\"]\nlegacy_config = \"tailwind.config.js\"\n",
        );
        let config = load(&path).expect("config should parse");
        assert_eq!(config.content, vec!["./src/**/*.{html,js}".to_string()]);
        assert_eq!(config.stylesheets, vec!["src/input.css".to_string()]);
        assert_eq!(config.legacy_config.as_deref(), Some("tailwind.config.js"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn defaults_when_empty() {
        let config = parse("").expect("config should parse");
        assert_eq!(config, Config::default());
        assert!(config.theme_entries().is_empty());
    }

    #[test]
    fn flattens_theme_tables() {
        let config = parse(
            r##"
[theme]
fontFamily = { display = ["Inter", "sans-serif"] }

[theme.colors.brand]
DEFAULT = "#ff0000"
500 = "#ee0000"
"##,
        )
        .expect("config should parse");
        assert_eq!(
            config.theme_entries(),
            vec![
                ("colors.brand.500".to_string(), "#ee0000".to_string()),
                ("colors.brand.DEFAULT".to_string(), "#ff0000".to_string()),
                ("fontFamily.display".to_string(), "Inter, sans-serif".to_string()),
            ]
        );
    }

    #[test]
    fn reports_missing_file() {
        let err = load(&temp_path("upgrade_config_missing")).unwrap_err();
        assert!(err.message.starts_with("failed to read config"));
    }

    fn temp_path(prefix: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}.toml", prefix, nanos))
    }
}
