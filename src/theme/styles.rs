use crate::paths::Category;
use crate::pipeline::Pipeline;
use crate::steps::{
    Changed, Dest, Less, MinifyCss, Prefix, Sass, SourceMapInit, SourceMapWrite, Stream,
};
use crate::{Blueprint, Environment, FileSet, FileSetError, TaskContext};

pub(super) const LESS: &[&str] = &["**/*.less"];
pub(super) const SASS: &[&str] = &["**/*.scss"];
pub(super) const PLAIN: &[&str] = &["**/*.css", "!*.min.css", "!**/*.min.css"];
const VENDOR: &[&str] = &["**/*.min.css"];

/// Compiled stylesheets that belong in the theme root, with their maps.
const ROOT: &[&str] = &["rtl.css*", "style.css*"];

pub(super) fn register(blueprint: &mut Blueprint) {
    blueprint
        .register("styles:less", &[], |ctx| {
            let sources = sources(ctx.env, LESS)?;
            finish(ctx, start(ctx, sources).pipe(Less::new()))
        })
        .register("styles:sass", &[], |ctx| {
            let sources = sources(ctx.env, SASS)?;
            finish(ctx, start(ctx, sources).pipe(Sass::new()))
        })
        .register("styles:postcss", &[], |ctx| {
            let sources = sources(ctx.env, PLAIN)?;
            finish(ctx, start(ctx, sources))
        })
        .register("styles:vendor", &[], vendor)
        .register(
            "styles:root",
            &["styles:less", "styles:sass", "styles:postcss", "styles:vendor"],
            |ctx| super::promote(ctx.env, &strays(ctx.env)?),
        )
        .register("styles", &["styles:root"], |ctx| {
            super::remove(&strays(ctx.env)?)
        });
}

fn sources(env: &Environment, patterns: &[&str]) -> Result<FileSet, FileSetError> {
    super::file_set(env, env.paths.source(Category::Styles), patterns)
}

fn strays(env: &Environment) -> Result<FileSet, FileSetError> {
    super::file_set(env, env.paths.destination(Category::Styles), ROOT)
}

/// Everything in front of the compiler. Stylesheets import each other, so
/// any edit in the batch rebuilds its importers.
fn start(ctx: &TaskContext, sources: FileSet) -> Pipeline {
    let env = ctx.env;
    let dest = env.locate(env.paths.destination(Category::Styles));

    Pipeline::new(ctx.name, sources)
        .pipe_if(
            env.profile.is_development(),
            Changed::new(dest).extension("css").imports(),
        )
        .pipe(SourceMapInit::new())
}

/// Everything after the compiler.
fn finish(ctx: &TaskContext, pipeline: Pipeline) -> anyhow::Result<()> {
    let env = ctx.env;
    let dest = env.locate(env.paths.destination(Category::Styles));

    pipeline
        .pipe(Prefix::new())
        .pipe_if(env.profile.is_production(), MinifyCss::new())
        .pipe(SourceMapWrite::new())
        .pipe(Dest::new(dest))
        .pipe_if(env.profile.is_development(), Stream::new())
        .run(env)?;

    Ok(())
}

/// Already minified stylesheets are copied as they are.
fn vendor(ctx: &TaskContext) -> anyhow::Result<()> {
    let env = ctx.env;
    let dev = env.profile.is_development();
    let dest = env.locate(env.paths.destination(Category::Styles));

    Pipeline::new(ctx.name, sources(env, VENDOR)?)
        .pipe_if(dev, Changed::new(&dest))
        .pipe(Dest::new(dest))
        .pipe_if(dev, Stream::new())
        .run(env)?;

    Ok(())
}
