use crate::paths::Category;
use crate::pipeline::Pipeline;
use crate::steps::{Changed, Dest, Optimize, Stream};
use crate::{Blueprint, Environment, TaskContext};

pub(super) fn register(blueprint: &mut Blueprint) {
    blueprint
        .register("images:optimize", &[], optimize)
        .register("images:root", &["images:optimize"], |ctx| {
            super::promote(ctx.env, &strays(ctx.env)?)
        })
        .register("images", &["images:root"], |ctx| {
            super::remove(&strays(ctx.env)?)
        });
}

/// One pattern per configured extension.
pub(super) fn patterns(env: &Environment) -> Vec<String> {
    env.config
        .images
        .extensions
        .iter()
        .map(|ext| format!("**/*.{ext}"))
        .collect()
}

/// Optimized images that belong in the theme root.
fn strays(env: &Environment) -> Result<crate::FileSet, crate::FileSetError> {
    super::file_set(
        env,
        env.paths.destination(Category::Images),
        ["screenshot.png"],
    )
}

fn optimize(ctx: &TaskContext) -> anyhow::Result<()> {
    let env = ctx.env;
    let dev = env.profile.is_development();
    let sources = super::file_set(env, env.paths.source(Category::Images), patterns(env))?;
    let dest = env.locate(env.paths.destination(Category::Images));

    let optimize = if dev {
        Optimize::cached(env.cache.clone())
    } else {
        Optimize::new()
    };

    let report = Pipeline::new(ctx.name, sources)
        .pipe_if(dev, Changed::new(&dest))
        .pipe(optimize)
        .pipe(Dest::new(dest))
        .pipe_if(dev, Stream::new())
        .run(env)?;

    tracing::debug!(
        matched = report.matched,
        written = report.written().len(),
        "images optimized"
    );
    Ok(())
}
