use crate::error::StepError;
use crate::pipeline::{Asset, FileStep, StepContext};
use crate::toolchain::{Loader, Transform};

fn esbuild(ctx: &StepContext, mut asset: Asset, minify: bool) -> Result<Asset, StepError> {
    let output = ctx.env.toolchain.esbuild(&Transform {
        loader: Loader::Js,
        source: asset.text()?,
        sourcefile: &asset.relative,
        target: &ctx.env.config.scripts.target,
        minify,
        map: asset.map.as_ref(),
    })?;

    if asset.map.is_some() {
        asset.map = output.map;
    }
    asset.set_text(output.code);
    Ok(asset)
}

/// Lowers modern syntax to the configured target.
#[derive(Debug, Clone, Default)]
pub struct Transpile;

impl Transpile {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for Transpile {
    fn name(&self) -> &'static str {
        "transpile"
    }

    fn transform(&self, ctx: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError> {
        esbuild(ctx, asset, false).map(Some)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MinifyJs;

impl MinifyJs {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for MinifyJs {
    fn name(&self) -> &'static str {
        "minify:js"
    }

    fn transform(&self, ctx: &StepContext, asset: Asset) -> Result<Option<Asset>, StepError> {
        esbuild(ctx, asset, true).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::steps::{SourceMapInit, SourceMapWrite};
    use crate::{FileSet, Profile, testing};

    #[test]
    fn test_transpile_keeps_map() {
        let (_dir, env, _) = testing::environment(Profile::Production);
        crate::io::write_file(&env.locate("src/scripts/app.js"), "const a = () => 1;\n").unwrap();

        let sources = FileSet::new([env.glob("src/scripts", "*.js")]).unwrap();
        let report = Pipeline::new("test", sources)
            .pipe(SourceMapInit::new())
            .pipe(Transpile::new())
            .pipe(MinifyJs::new())
            .pipe(SourceMapWrite::new())
            .run(&env)
            .unwrap();

        let asset = &report.assets[0];
        assert!(asset.text().unwrap().starts_with("/* min */\n/* transpiled */\n"));
        assert!(asset.text().unwrap().ends_with("//# sourceMappingURL=app.js.map\n"));
        assert!(asset.sidecar.is_some());
    }

    #[test]
    fn test_tool_failure_drops_file() {
        let (_dir, env, notes) = testing::environment(Profile::Production);
        crate::io::write_file(&env.locate("src/scripts/broken.js"), "syntax error(").unwrap();

        let sources = FileSet::new([env.glob("src/scripts", "*.js")]).unwrap();
        let report = Pipeline::new("scripts:local", sources)
            .pipe(Transpile::new())
            .run(&env)
            .unwrap();

        assert!(report.assets.is_empty());
        assert_eq!(report.matched, 1);
        assert_eq!(notes.take().len(), 1);
    }
}
