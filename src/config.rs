//! Build configuration.
//!
//! Everything here has a default matching the conventional theme layout, so a
//! project without a `shikake.toml` file builds out of the box. When the file
//! exists, any table or key it sets overrides the default.
//!
//! ```toml
//! [paths]
//! entry = "src"
//! output = "dist"
//!
//! [paths.prod]
//! styles = "css"
//!
//! [lint]
//! globals = ["$", "jQuery", "wp"]
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::paths::Category;

/// Default name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "shikake.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathConfig,
    pub images: ImageConfig,
    pub styles: StyleConfig,
    pub scripts: ScriptConfig,
    pub lint: LintConfig,
    pub notify: NotifyConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    #[serde(rename = "static")]
    pub statics: StaticConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicitly passed path must exist. Without one, [`CONFIG_FILE`] in
    /// `base` is used if present, defaults otherwise.
    pub fn load(base: &Utf8Path, path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (base.join(path), true),
            None => (base.join(CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            tracing::debug!("no {} found, using defaults", CONFIG_FILE);
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
        let config = Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse(_, e) => ConfigError::Parse(path.clone(), e),
            other => other,
        })?;

        tracing::info!(path = %path, "loaded configuration");
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::Parse(Utf8PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.paths.validate()
    }
}

/// Directory fragments of the project layout.
///
/// Fragments are joined by the path resolver, so they must never carry
/// leading or trailing separators.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfig {
    /// Project root, where development output lands.
    pub root: String,
    /// Root of all sources.
    pub entry: String,
    /// Root of the production output.
    pub output: String,
    /// Node dependencies, searched for tool binaries.
    pub node: String,
    pub dev: DevPaths,
    pub prod: ProdPaths,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            root: ".".into(),
            entry: "src".into(),
            output: "dist".into(),
            node: "node_modules".into(),
            dev: DevPaths::default(),
            prod: ProdPaths::default(),
        }
    }
}

impl PathConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fragments = [
            ("paths.root", &self.root),
            ("paths.entry", &self.entry),
            ("paths.output", &self.output),
            ("paths.node", &self.node),
            ("paths.dev.images", &self.dev.images),
            ("paths.dev.styles", &self.dev.styles),
            ("paths.dev.scripts", &self.dev.scripts),
            ("paths.prod.root", &self.prod.root),
            ("paths.prod.images", &self.prod.images),
            ("paths.prod.styles", &self.prod.styles),
            ("paths.prod.scripts", &self.prod.scripts),
        ];

        for (key, value) in fragments {
            validate_fragment(key, value)?;
        }

        Ok(())
    }
}

fn validate_fragment(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyFragment { key });
    }

    let is_separator = |c: char| c == '/' || c == '\\';
    if value.starts_with(is_separator) || value.ends_with(is_separator) {
        return Err(ConfigError::Separator {
            key,
            value: value.to_string(),
        });
    }

    Ok(())
}

/// Source fragments, relative to `entry`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevPaths {
    pub images: String,
    pub styles: String,
    pub scripts: String,
}

impl Default for DevPaths {
    fn default() -> Self {
        Self {
            images: "images".into(),
            styles: "styles".into(),
            scripts: "scripts".into(),
        }
    }
}

impl DevPaths {
    pub fn get(&self, category: Category) -> &str {
        match category {
            Category::Images => &self.images,
            Category::Styles => &self.styles,
            Category::Scripts => &self.scripts,
        }
    }
}

/// Destination fragments, relative to `root` (development) or `output`
/// (production), both under the shared assets `root`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProdPaths {
    pub root: String,
    pub images: String,
    pub styles: String,
    pub scripts: String,
}

impl Default for ProdPaths {
    fn default() -> Self {
        Self {
            root: "assets".into(),
            images: "images".into(),
            styles: "css".into(),
            scripts: "js".into(),
        }
    }
}

impl ProdPaths {
    pub fn get(&self, category: Category) -> &str {
        match category {
            Category::Images => &self.images,
            Category::Styles => &self.styles,
            Category::Scripts => &self.scripts,
        }
    }
}

/// PNG compression effort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngLevel {
    Fast,
    Default,
    #[default]
    Best,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Image extensions picked up by the images pipeline.
    pub extensions: Vec<String>,
    pub png: PngLevel,
    /// Re-encode JPEG files at this quality. Unset keeps them byte-exact.
    pub jpeg_quality: Option<u8>,
    /// Strip comments and inter-tag whitespace from SVG files.
    pub minify_svg: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            extensions: ["gif", "jpg", "jpeg", "png", "svg"]
                .map(String::from)
                .to_vec(),
            png: PngLevel::Best,
            jpeg_quality: None,
            minify_svg: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleConfig {
    /// Browser targets for vendor prefixing, in esbuild syntax.
    pub targets: Vec<String>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            targets: ["chrome109", "edge109", "firefox115", "safari15", "ios15"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    /// Language target for transpilation, in esbuild syntax.
    pub target: Vec<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            target: vec!["es2015".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    /// Shared rule set the linter extends.
    pub extends: String,
    pub envs: Vec<String>,
    /// Globals exempt from undefined reference errors.
    pub globals: Vec<String>,
    /// Write automatic fixes back to the sources.
    pub fix: bool,
    /// Additional files linted together with the script sources, relative
    /// to the project root.
    pub extra: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            extends: "airbnb-base".into(),
            envs: vec!["browser".into()],
            globals: ["$", "jQuery", "wp"].map(String::from).to_vec(),
            fix: true,
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub title: String,
    /// Ring the terminal bell on every notification.
    pub bell: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            title: "Compile Error".into(),
            bell: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Port of the development HTTP server.
    pub port: u16,
    /// Preferred port of the live-reload websocket.
    pub reload_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            reload_port: 35729,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Globs, relative to the project root, whose changes only trigger a
    /// full browser reload.
    pub reload: Vec<String>,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reload: vec!["**/*.php".into()],
            debounce_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// Globs, relative to the project root, never copied into the output.
    /// Source, output, node and asset directories are always excluded.
    pub exclude: Vec<String>,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            exclude: [
                "**/_*/**/*",
                CONFIG_FILE,
                "Cargo.toml",
                "Cargo.lock",
                "package.json",
                "package-lock.json",
                "README.*",
                "rtl.css",
                "screenshot.png",
                "style.css",
                "yarn.lock",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Names of the external tool binaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub esbuild: String,
    pub eslint: String,
    pub lessc: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            esbuild: "esbuild".into(),
            eslint: "eslint".into(),
            lessc: "lessc".into(),
        }
    }
}
