//! Stylesheet steps.
//!
//! Sass is compiled in-process with `grass`; Less, prefixing and
//! minification go through the toolchain.

use crate::error::StepError;
use crate::pipeline::{Asset, FileStep, SourceMap, StepContext};
use crate::toolchain::{Loader, Transform};

/// Replaces the contents of a freshly compiled stylesheet.
///
/// Neither compiler reports a map, so tracking restarts from the compiled
/// output.
fn compiled(mut asset: Asset, css: String) -> Asset {
    asset.set_extension("css");
    if asset.map.is_some() {
        asset.map = Some(SourceMap::identity(asset.relative.as_str(), &css));
    }
    asset.set_text(css);
    asset
}

/// Partials are only ever imported, never compiled on their own.
fn is_partial(asset: &Asset) -> bool {
    asset.file_name().starts_with('_')
}

#[derive(Debug, Clone, Default)]
pub struct Sass;

impl Sass {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for Sass {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn transform(&self, _: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError> {
        if is_partial(&asset) {
            return Ok(None);
        }

        let options = grass::Options::default().style(grass::OutputStyle::Expanded);
        let css = grass::from_path(&asset.source, &options)?;

        Ok(Some(compiled(asset, css)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Less;

impl Less {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for Less {
    fn name(&self) -> &'static str {
        "less"
    }

    fn transform(&self, ctx: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError> {
        let css = ctx.env.toolchain.lessc(&asset.source, asset.text()?)?;
        Ok(Some(compiled(asset, css)))
    }
}

fn esbuild(ctx: &StepContext, mut asset: Asset, minify: bool) -> Result<Asset, StepError> {
    let target = &ctx.env.config.styles.targets;
    let output = ctx.env.toolchain.esbuild(&Transform {
        loader: Loader::Css,
        source: asset.text()?,
        sourcefile: &asset.relative,
        target,
        minify,
        map: asset.map.as_ref(),
    })?;

    if asset.map.is_some() {
        asset.map = output.map;
    }
    asset.set_text(output.code);
    Ok(asset)
}

/// Adds vendor prefixes for the configured browser targets.
#[derive(Debug, Clone, Default)]
pub struct Prefix;

impl Prefix {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for Prefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn transform(&self, ctx: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError> {
        esbuild(ctx, asset, false).map(Some)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MinifyCss;

impl MinifyCss {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for MinifyCss {
    fn name(&self) -> &'static str {
        "minify:css"
    }

    fn transform(&self, ctx: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError> {
        esbuild(ctx, asset, true).map(Some)
    }
}
