use std::fmt::Write;

use console::style;

use crate::error::StepError;
use crate::pipeline::{Asset, Step, StepContext};
use crate::toolchain::{LintReport, Severity};

/// When a lint run gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Stop at the first file with errors.
    FirstError,
    /// Lint every file, then fail if any had errors.
    AfterBatch,
}

/// Lints the batch, writing automatic fixes back to the sources.
#[derive(Debug, Clone)]
pub struct Lint {
    fail: FailMode,
}

impl Lint {
    pub fn new(fail: FailMode) -> Self {
        Self { fail }
    }

    fn lint(&self, ctx: &StepContext, asset: &mut Asset) -> Result<LintReport, StepError> {
        let config = &ctx.env.config.lint;
        let report = ctx
            .env
            .toolchain
            .eslint(&asset.source, asset.text()?, config)?;

        if config.fix
            && let Some(fixed) = &report.output
            && fixed.as_bytes() != asset.contents.as_slice()
        {
            std::fs::write(&asset.source, fixed)?;
            tracing::info!(file = %asset.source, "applied lint fixes");
            asset.set_text(fixed.clone());
        }

        Ok(report)
    }
}

impl Step for Lint {
    fn name(&self) -> &'static str {
        "lint"
    }

    fn apply(&self, ctx: &StepContext, mut assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        let mut failed = Vec::new();
        let mut errors = 0;

        for asset in &mut assets {
            let report = match self.lint(ctx, asset) {
                Ok(report) => report,
                Err(err) => {
                    // notified once with the rest of the batch below
                    tracing::error!(pipeline = ctx.pipeline, file = %asset.source, "{err}");
                    failed.push(asset.source.to_string());
                    errors += 1;

                    if self.fail == FailMode::FirstError {
                        break;
                    }
                    continue;
                }
            };

            if !report.messages.is_empty() {
                tracing::warn!("{}", format_report(asset, &report));
            }

            if report.error_count() > 0 {
                failed.push(asset.source.to_string());
                errors += report.error_count();

                if self.fail == FailMode::FirstError {
                    break;
                }
            }
        }

        if failed.is_empty() {
            return Ok(assets);
        }

        let err = StepError::Lint {
            files: failed,
            errors,
        };
        ctx.env.report(ctx.pipeline, err.to_string());
        Err(err)
    }
}

/// Renders the problems of one file, one line per message.
fn format_report(asset: &Asset, report: &LintReport) -> String {
    let mut out = format!("{}", style(&asset.source).underlined());

    for message in &report.messages {
        let severity = match message.severity {
            Severity::Error => style("error").red(),
            Severity::Warning => style("warning").yellow(),
        };

        let _ = write!(
            out,
            "\n  {}  {severity}  {}",
            style(format!("{}:{}", message.line, message.column)).dim(),
            message.message,
        );

        if let Some(rule) = &message.rule {
            let _ = write!(out, "  {}", style(rule).dim());
        }
    }

    let _ = write!(
        out,
        "\n{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );

    out
}
