//! External Node tools.
//!
//! Less compilation, CSS prefixing and minification, script transpilation
//! and minification are done by `lessc` and `esbuild`, linting by `eslint`.
//! Binaries are looked up in the project's `node_modules/.bin` first and on
//! the `PATH` otherwise.
//!
//! Pipelines only see the [`Toolchain`] trait, so tests can swap the
//! subprocesses for an in-memory implementation.

use std::io::Write;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::config::{LintConfig, ToolsConfig};
use crate::error::ToolError;
use crate::pipeline::SourceMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Css,
    Js,
}

impl Loader {
    pub fn as_str(self) -> &'static str {
        match self {
            Loader::Css => "css",
            Loader::Js => "js",
        }
    }
}

/// A single esbuild transform.
#[derive(Debug, Clone)]
pub struct Transform<'a> {
    pub loader: Loader,
    pub source: &'a str,
    /// Name reported in diagnostics and source maps.
    pub sourcefile: &'a Utf8Path,
    pub target: &'a [String],
    pub minify: bool,
    /// Map of `source`. When present, the output map is composed with it.
    pub map: Option<&'a SourceMap>,
}

#[derive(Debug, Clone)]
pub struct Transformed {
    pub code: String,
    pub map: Option<SourceMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintMessage {
    pub rule: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Result of linting one file.
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    /// Fixed source, when automatic fixes changed anything.
    pub output: Option<String>,
    /// Problems left after fixing.
    pub messages: Vec<LintMessage>,
}

impl LintReport {
    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Warning)
            .count()
    }
}

pub trait Toolchain: Send + Sync {
    /// Compiles Less source to CSS. `path` locates relative imports.
    fn lessc(&self, path: &Utf8Path, source: &str) -> Result<String, ToolError>;

    fn esbuild(&self, transform: &Transform) -> Result<Transformed, ToolError>;

    fn eslint(
        &self,
        path: &Utf8Path,
        source: &str,
        config: &LintConfig,
    ) -> Result<LintReport, ToolError>;
}

/// Runs the real tools as subprocesses.
#[derive(Debug, Clone)]
pub struct NodeToolchain {
    bin: Utf8PathBuf,
    tools: ToolsConfig,
}

impl NodeToolchain {
    pub fn new(bin: impl Into<Utf8PathBuf>, tools: ToolsConfig) -> Self {
        Self {
            bin: bin.into(),
            tools,
        }
    }

    fn resolve(&self, tool: &str) -> String {
        let local = self.bin.join(tool);
        if local.is_file() {
            local.into_string()
        } else {
            tool.to_string()
        }
    }

    fn command(&self, tool: &str) -> (String, Command) {
        let program = self.resolve(tool);
        let command = Command::new(&program);
        (program, command)
    }
}

/// Runs a command with `stdin` fed on a separate thread so that large
/// outputs can't deadlock the pipes.
fn execute(
    tool: &str,
    mut command: Command,
    stdin: Option<&str>,
    accept: &[i32],
) -> Result<String, ToolError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_string();
            Some(std::thread::spawn(move || pipe.write_all(input.as_bytes())))
        }
        _ => None,
    };

    let output = child.wait_with_output()?;

    if let Some(writer) = writer {
        // a tool exiting early closes the pipe, its status tells more
        let _ = writer.join();
    }

    let code = output.status.code().unwrap_or(-1);
    if !output.status.success() && !accept.contains(&code) {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8(output.stdout)?)
}

impl Toolchain for NodeToolchain {
    fn lessc(&self, path: &Utf8Path, source: &str) -> Result<String, ToolError> {
        let (program, mut command) = self.command(&self.tools.lessc);

        if let Some(dir) = path.parent() {
            command.arg(format!("--include-path={dir}"));
        }
        command.arg("-");

        execute(&program, command, Some(source), &[])
    }

    fn esbuild(&self, transform: &Transform) -> Result<Transformed, ToolError> {
        let (program, mut command) = self.command(&self.tools.esbuild);

        if !transform.target.is_empty() {
            command.arg(format!("--target={}", transform.target.join(",")));
        }
        if transform.minify {
            command.arg("--minify");
        }

        let Some(map) = transform.map else {
            command
                .arg(format!("--loader={}", transform.loader.as_str()))
                .arg(format!("--sourcefile={}", transform.sourcefile))
                .arg("--log-level=warning");

            let code = execute(&program, command, Some(transform.source), &[])?;
            return Ok(Transformed { code, map: None });
        };

        // Source maps need real files: esbuild picks up the input map from a
        // trailing comment and writes the composed map next to the output.
        let tmp = tempfile::tempdir()?;
        let dir = Utf8PathBuf::from(tmp.path().to_string_lossy().into_owned());

        let ext = transform.loader.as_str();
        let input = dir.join(format!("input.{ext}"));
        let output = dir.join(format!("output.{ext}"));

        let comment = match transform.loader {
            Loader::Css => "\n/*# sourceMappingURL=input.map */\n",
            Loader::Js => "\n//# sourceMappingURL=input.map\n",
        };

        let json = serde_json::to_string(map).map_err(|source| ToolError::Output {
            tool: program.clone(),
            source,
        })?;

        std::fs::write(&input, format!("{}{comment}", transform.source))?;
        std::fs::write(dir.join("input.map"), json)?;

        command
            .arg(input.as_str())
            .arg(format!("--outfile={output}"))
            .arg("--sourcemap=external")
            .arg("--log-level=warning");

        execute(&program, command, None, &[])?;

        let code = std::fs::read_to_string(&output)?;
        let map = std::fs::read_to_string(format!("{output}.map"))?;
        let map = serde_json::from_str(&map).map_err(|source| ToolError::Output {
            tool: program.clone(),
            source,
        })?;

        drop(tmp);
        Ok(Transformed {
            code,
            map: Some(map),
        })
    }

    fn eslint(
        &self,
        path: &Utf8Path,
        source: &str,
        config: &LintConfig,
    ) -> Result<LintReport, ToolError> {
        let (program, mut command) = self.command(&self.tools.eslint);

        let dir = tempfile::tempdir()?;
        let rc = dir.path().join("eslintrc.json");
        std::fs::write(&rc, eslintrc(config).to_string())?;

        command
            .arg("--no-eslintrc")
            .arg("--config")
            .arg(&rc)
            .arg("--format=json")
            .arg("--stdin")
            .arg(format!("--stdin-filename={path}"));

        if config.fix {
            command.arg("--fix-dry-run");
        }

        // eslint exits with 1 when it found problems
        let stdout = execute(&program, command, Some(source), &[1])?;

        parse_eslint(&stdout).map_err(|source| ToolError::Output {
            tool: program,
            source,
        })
    }
}

/// Builds a standalone eslint configuration from the lint settings.
fn eslintrc(config: &LintConfig) -> serde_json::Value {
    let envs: serde_json::Map<_, _> = config
        .envs
        .iter()
        .map(|env| (env.clone(), serde_json::Value::Bool(true)))
        .collect();

    let globals: serde_json::Map<_, _> = config
        .globals
        .iter()
        .map(|name| (name.clone(), serde_json::Value::from("readonly")))
        .collect();

    serde_json::json!({
        "root": true,
        "extends": config.extends,
        "env": envs,
        "globals": globals,
        "parserOptions": {
            "ecmaVersion": "latest",
            "sourceType": "module",
        },
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintFile {
    #[serde(default)]
    messages: Vec<EslintMessage>,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintMessage {
    #[serde(default)]
    rule_id: Option<String>,
    severity: u8,
    message: String,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    column: u32,
}

fn parse_eslint(stdout: &str) -> Result<LintReport, serde_json::Error> {
    let files: Vec<EslintFile> = serde_json::from_str(stdout)?;

    let mut report = LintReport::default();
    for file in files {
        report.output = report.output.or(file.output);
        report
            .messages
            .extend(file.messages.into_iter().map(|m| LintMessage {
                rule: m.rule_id,
                severity: if m.severity >= 2 {
                    Severity::Error
                } else {
                    Severity::Warning
                },
                message: m.message,
                line: m.line,
                column: m.column,
            }));
    }

    Ok(report)
}
