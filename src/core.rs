use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::notify::{ConsoleNotifier, Notification, Notifier};
use crate::paths::PathResolver;
use crate::reload::LiveReload;
use crate::steps::image::ImageCache;
use crate::toolchain::{NodeToolchain, Toolchain};

/// A 32-byte BLAKE3 hash used as the key of the image optimization cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash_all<'a>(buffers: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for buffer in buffers {
            hasher.update(buffer);
        }
        hasher.finalize().into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in self.0.iter() {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// The build profile, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Writes into the project tree, caches, watches and reloads.
    #[default]
    Development,
    /// Writes into the output tree, minifies and exits.
    Production,
}

impl Profile {
    /// Reads the profile from a `NODE_ENV` style value. Only `production`
    /// selects the production profile.
    pub fn from_node_env(value: Option<&str>) -> Self {
        match value {
            Some("production") => Profile::Production,
            _ => Profile::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Profile::Production
    }

    pub fn is_development(self) -> bool {
        self == Profile::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }
}

/// Everything a task needs to know about the build it is part of.
///
/// The environment is created once at startup and passed explicitly to every
/// task. Cloning is cheap, the collaborators are shared.
#[derive(Clone)]
pub struct Environment {
    /// The build profile.
    pub profile: Profile,
    /// Directory every configured path is relative to.
    pub base: Utf8PathBuf,
    pub config: Arc<Config>,
    pub paths: PathResolver,
    pub toolchain: Arc<dyn Toolchain>,
    pub notifier: Arc<dyn Notifier>,
    /// Present while a live-reload server is accepting clients.
    pub reload: Option<LiveReload>,
    /// Development-only image optimization cache.
    pub cache: ImageCache,
}

impl Environment {
    pub fn new(
        profile: Profile,
        base: impl Into<Utf8PathBuf>,
        config: Config,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let base = base.into();
        let paths = PathResolver::new(profile, config.paths.clone());
        let bin = crate::io::normalize_path(
            &base
                .join(&config.paths.root)
                .join(&config.paths.node)
                .join(".bin"),
        );
        let toolchain = NodeToolchain::new(bin, config.tools.clone());
        let notifier = ConsoleNotifier::new(&config.notify);
        let cache = ImageCache::new(base.join(".cache/shikake/images"));

        Ok(Self {
            profile,
            base,
            config: Arc::new(config),
            paths,
            toolchain: Arc::new(toolchain),
            notifier: Arc::new(notifier),
            reload: None,
            cache,
        })
    }

    pub fn with_toolchain(mut self, toolchain: impl Toolchain + 'static) -> Self {
        self.toolchain = Arc::new(toolchain);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn with_reload(mut self, reload: LiveReload) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Turns a configured relative path into a path on disk.
    pub fn locate(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        crate::io::normalize_path(&self.base.join(path))
    }

    /// Builds a glob pattern rooted at a configured directory.
    pub fn glob(&self, dir: impl AsRef<Utf8Path>, pattern: &str) -> String {
        let dir = self.locate(dir);
        if pattern.is_empty() {
            dir.into_string()
        } else {
            format!("{dir}/{pattern}")
        }
    }

    /// Same as [`Environment::glob`], as a negated pattern.
    pub fn exclude(&self, dir: impl AsRef<Utf8Path>, pattern: &str) -> String {
        format!("!{}", self.glob(dir, pattern))
    }

    pub(crate) fn report(&self, task: &str, message: impl Into<String>) {
        let notification = Notification {
            title: self.config.notify.title.clone(),
            task: task.to_string(),
            message: message.into(),
        };
        self.notifier.notify(&notification);
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("profile", &self.profile)
            .field("base", &self.base)
            .field("reload", &self.reload.is_some())
            .finish()
    }
}

/// The context passed to every task body.
pub struct TaskContext<'a> {
    /// Name of the running task.
    pub name: &'a str,
    /// The build environment.
    pub env: &'a Environment,
    /// Tracing span assigned to this task.
    pub(crate) span: tracing::Span,
}

impl TaskContext<'_> {
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}
