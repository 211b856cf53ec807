#[cfg(feature = "live")]
use std::sync::mpsc::RecvError;

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShikakeError {
    #[error("Invalid configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid task graph:\n{0}")]
    Graph(#[from] GraphError),

    #[error("Error while building the theme.\n{0}")]
    Build(#[from] BuildError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file '{0}'.\n{1}")]
    Parse(Utf8PathBuf, toml::de::Error),

    #[error("Path fragment '{key}' must not be empty")]
    EmptyFragment { key: &'static str },

    #[error("Path fragment '{key}' = '{value}' must not start or end with a path separator")]
    Separator { key: &'static str, value: String },

    #[error("Unknown content category '{0}', expected one of: images, styles, scripts")]
    UnknownCategory(String),

    #[error("Unknown path direction '{0}', expected one of: source, destination")]
    UnknownDirection(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task '{0}' is registered more than once")]
    Duplicate(String),

    #[error("Task '{task}' depends on unknown task '{prerequisite}'")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Cycle detected between tasks: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Task '{0}' not found")]
    UnknownTask(String),
}

#[derive(Debug, Error)]
pub enum FileSetError {
    #[error("Couldn't compile glob pattern '{0}'.\n{1}")]
    Pattern(String, glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

/// Errors reported by the external Node tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Couldn't start '{tool}'.\n{source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("'{tool}' exited with {status}:\n{stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Couldn't parse '{tool}' output.\n{source}")]
    Output {
        tool: String,
        source: serde_json::Error,
    },
}

/// Errors raised by a single pipeline step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    FileSet(#[from] FileSetError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("File '{0}' is not valid UTF-8")]
    Encoding(Utf8PathBuf),

    #[error("Source map error: {0}")]
    SourceMap(#[from] serde_json::Error),

    #[error("{errors} lint error(s) in {}", .files.join(", "))]
    Lint { files: Vec<String>, errors: usize },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Task '{0}':\n{1}")]
    Task(String, anyhow::Error),

    #[error("Task '{0}' was skipped because a prerequisite failed")]
    Skipped(String),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error(transparent)]
    FileSet(#[from] FileSetError),
}
