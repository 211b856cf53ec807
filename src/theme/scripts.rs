use crate::paths::Category;
use crate::pipeline::Pipeline;
use crate::steps::{
    Changed, Dest, FailMode, Lint, MinifyJs, SourceMapInit, SourceMapWrite, Transpile,
};
use crate::{Blueprint, Environment, FileSet, FileSetError, Profile, TaskContext};

const LOCAL: &[&str] = &["**/*.js", "!*.min.js", "!**/*.min.js"];
const VENDOR: &[&str] = &["**/*.min.js"];

pub(super) fn register(blueprint: &mut Blueprint, profile: Profile) {
    blueprint
        .register("scripts:lint", &[], lint)
        .register("scripts:local", &["scripts:lint"], local)
        .register("scripts:vendor", &[], vendor);

    let prerequisites = &["scripts:local", "scripts:vendor"];
    match profile {
        Profile::Production => blueprint.group("scripts", prerequisites),
        Profile::Development => blueprint.register("scripts", prerequisites, |ctx| {
            if let Some(reload) = &ctx.env.reload {
                reload.reload();
            }
            Ok(())
        }),
    };
}

fn sources(env: &Environment, patterns: &[&str]) -> Result<FileSet, FileSetError> {
    super::file_set(env, env.paths.source(Category::Scripts), patterns)
}

fn lint(ctx: &TaskContext) -> anyhow::Result<()> {
    let env = ctx.env;
    let dir = env.paths.source(Category::Scripts);

    // extra files live outside the sources, next to the build config
    let root = &env.config.paths.root;
    let patterns = LOCAL
        .iter()
        .map(|pattern| super::rooted(env, &dir, pattern))
        .chain(env.config.lint.extra.iter().map(|extra| env.glob(root, extra)));

    // a watched build reports every broken file before failing
    let fail = match env.reload {
        Some(_) => FailMode::AfterBatch,
        None => FailMode::FirstError,
    };

    Pipeline::new(ctx.name, FileSet::new(patterns)?)
        .pipe(Lint::new(fail))
        .run(env)?;

    Ok(())
}

fn local(ctx: &TaskContext) -> anyhow::Result<()> {
    let env = ctx.env;
    let dest = env.locate(env.paths.destination(Category::Scripts));

    Pipeline::new(ctx.name, sources(env, LOCAL)?)
        .pipe_if(env.profile.is_development(), Changed::new(&dest))
        .pipe(SourceMapInit::new())
        .pipe(Transpile::new())
        .pipe_if(env.profile.is_production(), MinifyJs::new())
        .pipe(SourceMapWrite::new())
        .pipe(Dest::new(dest))
        .run(env)?;

    Ok(())
}

fn vendor(ctx: &TaskContext) -> anyhow::Result<()> {
    let env = ctx.env;
    let dest = env.locate(env.paths.destination(Category::Scripts));

    Pipeline::new(ctx.name, sources(env, VENDOR)?)
        .pipe_if(env.profile.is_development(), Changed::new(&dest))
        .pipe(Dest::new(dest))
        .run(env)?;

    Ok(())
}
