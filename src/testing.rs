//! Test doubles for the external world.

use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::config::{Config, LintConfig};
use crate::error::ToolError;
use crate::notify::{Notification, Notifier};
use crate::pipeline::SourceMap;
use crate::toolchain::{
    LintMessage, LintReport, Loader, Severity, Toolchain, Transform, Transformed,
};
use crate::{Environment, Profile};

/// Predictable stand-in for the Node tools.
///
/// Every transform prepends a marker comment. Sources containing
/// `syntax error` fail to transform and to lint. The linter reports each use
/// of `undefinedThing` as an error and fixes `var` declarations and missing
/// semicolons.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeToolchain;

fn failed(tool: &str, message: &str) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        status: std::process::ExitStatus::default(),
        stderr: message.to_string(),
    }
}

impl Toolchain for FakeToolchain {
    fn lessc(&self, _: &Utf8Path, source: &str) -> Result<String, ToolError> {
        if source.contains("syntax error") {
            return Err(failed("lessc", "ParseError"));
        }
        Ok(format!("/* less */\n{source}"))
    }

    fn esbuild(&self, transform: &Transform) -> Result<Transformed, ToolError> {
        if transform.source.contains("syntax error") {
            return Err(failed("esbuild", "Unexpected token"));
        }

        let marker = match (transform.minify, transform.loader) {
            (true, _) => "/* min */",
            (false, Loader::Css) => "/* prefixed */",
            (false, Loader::Js) => "/* transpiled */",
        };

        let code = format!("{marker}\n{}", transform.source);
        let map = transform
            .map
            .map(|_| SourceMap::identity(transform.sourcefile.as_str(), &code));

        Ok(Transformed { code, map })
    }

    fn eslint(
        &self,
        _: &Utf8Path,
        source: &str,
        config: &LintConfig,
    ) -> Result<LintReport, ToolError> {
        if source.contains("syntax error") {
            return Err(failed("eslint", "Parsing error"));
        }

        let mut fixed = String::with_capacity(source.len());
        let mut messages = Vec::new();

        for (i, line) in source.lines().enumerate() {
            if let Some(column) = line.find("undefinedThing") {
                messages.push(LintMessage {
                    rule: Some("no-undef".into()),
                    severity: Severity::Error,
                    message: "'undefinedThing' is not defined.".into(),
                    line: i as u32 + 1,
                    column: column as u32 + 1,
                });
            }

            let line = match line.strip_prefix("var ") {
                Some(rest) => format!("const {rest}"),
                None => line.to_string(),
            };
            fixed.push_str(&line);
            if !line.is_empty() && !line.ends_with([';', '{', '}']) {
                fixed.push(';');
            }
            fixed.push('\n');
        }

        let output = (config.fix && fixed != source).then_some(fixed);
        Ok(LintReport { output, messages })
    }
}

/// Collects notifications instead of showing them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Notes(Arc<Mutex<Vec<Notification>>>);

impl Notes {
    pub(crate) fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl Notifier for Notes {
    fn notify(&self, notification: &Notification) {
        self.0.lock().unwrap().push(notification.clone());
    }
}

/// An environment rooted in a fresh temporary directory, with the fake
/// toolchain and a recording notifier.
pub(crate) fn environment(profile: Profile) -> (TempDir, Environment, Notes) {
    environment_with(profile, Config::default())
}

pub(crate) fn environment_with(profile: Profile, config: Config) -> (TempDir, Environment, Notes) {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    let notes = Notes::default();

    let env = Environment::new(profile, base, config)
        .unwrap()
        .with_toolchain(FakeToolchain)
        .with_notifier(notes.clone());

    (dir, env, notes)
}
