//! File pipelines.
//!
//! A [`Pipeline`] reads a [`FileSet`] into memory and pushes the resulting
//! [`Asset`]s through an ordered list of [`Step`]s. The list is assembled
//! anew on every run, so conditional steps are simply left out of the list
//! instead of branching inside the step:
//!
//! ```rust,ignore
//! Pipeline::new("styles:sass", sources)
//!     .pipe_if(
//!         env.profile.is_development(),
//!         Changed::new(&dest).extension("css").imports(),
//!     )
//!     .pipe(Sass::new())
//!     .pipe_if(env.profile.is_production(), MinifyCss::new())
//!     .pipe(Dest::new(&dest))
//!     .run(env)?;
//! ```
//!
//! Most steps transform files one at a time and implement [`FileStep`]. A
//! failing file is reported through the environment's notifier and dropped
//! from the batch, the rest of the batch carries on. Steps that need to see
//! the whole batch, like linting, implement [`Step`] directly and may fail
//! the pipeline.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::Environment;
use crate::error::StepError;
use crate::fileset::FileSet;

/// Source map in the version 3 format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// A map pointing every line of `text` at the same line of `source`.
    pub fn identity(source: impl Into<String>, text: &str) -> Self {
        let lines = text.lines().count().max(1);
        let mut mappings = String::from("AAAA");
        for _ in 1..lines {
            mappings.push_str(";AACA");
        }

        Self {
            version: 3,
            file: None,
            sources: vec![source.into()],
            sources_content: vec![Some(text.to_string())],
            names: Vec::new(),
            mappings,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, StepError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, StepError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A file in flight through a pipeline.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Where the file was read from.
    pub source: Utf8PathBuf,
    /// Output path relative to the destination directory.
    pub relative: Utf8PathBuf,
    pub contents: Vec<u8>,
    /// Present once source tracking has started.
    pub map: Option<SourceMap>,
    /// Serialized map written next to the output.
    pub sidecar: Option<String>,
    /// Set once the asset has been written out.
    pub written: Option<Utf8PathBuf>,
}

impl Asset {
    pub fn new(source: Utf8PathBuf, relative: Utf8PathBuf, contents: Vec<u8>) -> Self {
        Self {
            source,
            relative,
            contents,
            map: None,
            sidecar: None,
            written: None,
        }
    }

    pub fn text(&self) -> Result<&str, StepError> {
        std::str::from_utf8(&self.contents).map_err(|_| StepError::Encoding(self.source.clone()))
    }

    pub fn set_text(&mut self, text: String) {
        self.contents = text.into_bytes();
    }

    pub fn set_extension(&mut self, extension: &str) {
        self.relative.set_extension(extension);
    }

    /// Name of the file as written out.
    pub fn file_name(&self) -> &str {
        self.relative.file_name().unwrap_or(self.relative.as_str())
    }

    pub fn extension(&self) -> Option<&str> {
        self.relative.extension()
    }
}

/// What a step sees besides the assets.
pub struct StepContext<'a> {
    /// Name of the pipeline, used when reporting errors.
    pub pipeline: &'a str,
    pub env: &'a Environment,
}

impl StepContext<'_> {
    /// Reports a failed file without failing the batch.
    pub fn report(&self, source: &Utf8Path, err: &StepError) {
        tracing::error!(pipeline = self.pipeline, file = %source, "{err}");
        self.env.report(self.pipeline, format!("{source}: {err}"));
    }
}

pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: &StepContext, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError>;
}

/// A step transforming each file independently.
pub trait FileStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` to drop the file from the batch.
    fn transform(&self, ctx: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError>;
}

// Per-file steps run in parallel; a failing file is reported and dropped.
impl<T> Step for T
where
    T: FileStep,
{
    fn name(&self) -> &'static str {
        FileStep::name(self)
    }

    fn apply(&self, ctx: &StepContext, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        let mut results: Vec<(usize, Asset)> = assets
            .into_par_iter()
            .enumerate()
            .filter_map(|(i, asset)| {
                let source = asset.source.clone();
                match self.transform(ctx, asset) {
                    Ok(asset) => asset.map(|asset| (i, asset)),
                    Err(err) => {
                        ctx.report(&source, &err);
                        None
                    }
                }
            })
            .collect();

        results.sort_by_key(|(i, _)| *i);
        Ok(results.into_iter().map(|(_, asset)| asset).collect())
    }
}

/// Summary of a finished pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Number of files matched by the sources.
    pub matched: usize,
    /// Assets that made it through every step.
    pub assets: Vec<Asset>,
}

impl PipelineReport {
    /// Files written to disk by the pipeline.
    pub fn written(&self) -> Vec<&Utf8Path> {
        self.assets
            .iter()
            .filter_map(|asset| asset.written.as_deref())
            .collect()
    }
}

pub struct Pipeline {
    name: String,
    sources: FileSet,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, sources: FileSet) -> Self {
        Self {
            name: name.into(),
            sources,
            steps: Vec::new(),
        }
    }

    pub fn pipe(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Appends the step only when `condition` holds.
    pub fn pipe_if(self, condition: bool, step: impl Step + 'static) -> Self {
        if condition { self.pipe(step) } else { self }
    }

    /// Names of the steps in execution order.
    pub fn steps(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn run(&self, env: &Environment) -> Result<PipelineReport, StepError> {
        let ctx = StepContext {
            pipeline: &self.name,
            env,
        };

        let entries = self.sources.entries()?;
        let matched = entries.len();

        let mut assets = Vec::with_capacity(matched);
        for entry in entries {
            match fs::read(&entry.path) {
                Ok(contents) => assets.push(Asset::new(
                    entry.path.clone(),
                    entry.relative().to_path_buf(),
                    contents,
                )),
                Err(err) => ctx.report(&entry.path, &StepError::Io(err)),
            }
        }

        for step in &self.steps {
            if assets.is_empty() {
                break;
            }

            tracing::debug!(pipeline = %self.name, step = step.name(), files = assets.len());
            assets = step.apply(&ctx, assets)?;
        }

        Ok(PipelineReport { matched, assets })
    }
}
