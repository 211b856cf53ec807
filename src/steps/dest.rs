use camino::Utf8PathBuf;

use crate::error::StepError;
use crate::pipeline::{Asset, FileStep, Step, StepContext};

/// Writes every asset under a destination directory, keeping its relative
/// path, together with its source map sidecar.
#[derive(Debug, Clone)]
pub struct Dest {
    dir: Utf8PathBuf,
}

impl Dest {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileStep for Dest {
    fn name(&self) -> &'static str {
        "dest"
    }

    fn transform(&self, _: &StepContext, mut asset: Asset) -> Result<Option<Asset>, StepError> {
        let path = self.dir.join(&asset.relative);
        crate::io::write_file(&path, &asset.contents)?;

        if let Some(sidecar) = &asset.sidecar {
            crate::io::write_file(&Utf8PathBuf::from(format!("{path}.map")), sidecar)?;
        }

        tracing::debug!(file = %path, "written");
        asset.written = Some(path);
        Ok(Some(asset))
    }
}

/// Pushes written files to connected browsers, stylesheets in place.
#[derive(Debug, Clone, Default)]
pub struct Stream;

impl Stream {
    pub fn new() -> Self {
        Self
    }
}

impl Step for Stream {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn apply(&self, ctx: &StepContext, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        if let Some(reload) = &ctx.env.reload {
            let written: Vec<_> = assets.iter().filter_map(|a| a.written.as_deref()).collect();
            reload.changed(&written);
        }
        Ok(assets)
    }
}
