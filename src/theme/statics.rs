use crate::pipeline::Pipeline;
use crate::steps::Dest;
use crate::{Blueprint, Environment, FileSet, FileSetError, TaskContext};

pub(super) fn register(blueprint: &mut Blueprint) {
    blueprint.register("static", &[], copy);
}

/// The theme files outside of the build's own directories.
fn sources(env: &Environment) -> Result<FileSet, FileSetError> {
    let paths = &env.config.paths;
    let generated = [&paths.entry, &paths.node, &paths.output, &paths.prod.root];

    let mut patterns = vec![
        "**/*".to_string(),
        "!**/.*".to_string(),
        "!**/.*/**/*".to_string(),
    ];
    patterns.extend(generated.iter().map(|dir| format!("!{dir}/**/*")));
    patterns.extend(env.config.statics.exclude.iter().map(|p| format!("!{p}")));

    super::file_set(env, &paths.root, patterns)
}

fn copy(ctx: &TaskContext) -> anyhow::Result<()> {
    let env = ctx.env;
    let output = env.locate(&env.config.paths.output);

    let report = Pipeline::new(ctx.name, sources(env)?)
        .pipe(Dest::new(output))
        .run(env)?;

    tracing::info!(files = report.written().len(), "copied static files");
    Ok(())
}
