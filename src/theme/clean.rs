use anyhow::Context;

use crate::{Blueprint, Environment, Profile, TaskContext};

/// Files the movers put into the theme root during development.
const ROOT_FILES: [&str; 3] = ["screenshot.png", "rtl.css", "style.css"];

pub(super) fn register(blueprint: &mut Blueprint, profile: Profile) {
    let clean: &[&str] = match profile {
        Profile::Production => &["clean:cache", "clean:prod"],
        Profile::Development => &["clean:dev"],
    };

    blueprint
        .register("clean:cache", &[], cache)
        .register("clean:prod", &[], |ctx| {
            delete(ctx.env, &[&ctx.env.config.paths.output])
        })
        .register("clean:dev", &[], dev)
        .group("clean:all", &["clean:cache", "clean:prod", "clean:dev"])
        .group("clean", clean);
}

fn cache(ctx: &TaskContext) -> anyhow::Result<()> {
    let cache = &ctx.env.cache;
    if cache
        .clear()
        .with_context(|| format!("couldn't clear {}", cache.dir()))?
    {
        tracing::info!(dir = %cache.dir(), "cleared image cache");
    }
    Ok(())
}

fn dev(ctx: &TaskContext) -> anyhow::Result<()> {
    let paths = &ctx.env.config.paths;
    let root = camino::Utf8Path::new(&paths.root);

    let mut targets = vec![root.join(&paths.prod.root)];
    targets.extend(ROOT_FILES.iter().map(|file| root.join(file)));
    delete(ctx.env, &targets)
}

fn delete<P: AsRef<camino::Utf8Path>>(env: &Environment, paths: &[P]) -> anyhow::Result<()> {
    for path in paths {
        let path = env.locate(path);
        if crate::io::remove_path(&path).with_context(|| format!("couldn't delete {path}"))? {
            tracing::debug!(path = %path, "deleted");
        }
    }
    Ok(())
}
