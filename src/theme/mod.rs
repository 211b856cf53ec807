//! The theme build: every task of the asset pipeline and the top-level
//! orchestration around them.
//!
//! The task set is fixed, only a few edges depend on the profile:
//!
//! - `clean` removes the production output and the image cache in
//!   production, the generated assets in development.
//! - `scripts` reloads connected browsers in development and is a plain
//!   group in production.

mod clean;
mod images;
mod scripts;
mod statics;
mod styles;

use camino::Utf8Path;

use crate::engine::{Report, WatchRule};
use crate::error::{FileSetError, GraphError, ShikakeError};
use crate::fileset::FileSet;
use crate::paths::Category;
use crate::{Blueprint, Environment, Profile, TaskGraph};

/// Content tasks, run side by side after `clean`.
pub const CONTENT: [&str; 3] = ["images", "styles", "scripts"];

/// Declares every theme task.
pub fn blueprint(profile: Profile) -> Blueprint {
    let mut blueprint = Blueprint::new();
    clean::register(&mut blueprint, profile);
    images::register(&mut blueprint);
    styles::register(&mut blueprint);
    scripts::register(&mut blueprint, profile);
    statics::register(&mut blueprint);
    blueprint
}

pub fn tasks(profile: Profile) -> Result<TaskGraph, GraphError> {
    blueprint(profile).finish()
}

/// Builds the theme once: `clean`, then the content tasks, then in
/// production `static`.
pub fn build(graph: &TaskGraph, env: &Environment) -> Result<Report, ShikakeError> {
    let mut report = graph.run(env, "clean")?.into_result()?;
    report.merge(graph.run_all(env, &CONTENT)?.into_result()?);

    if env.profile.is_production() {
        report.merge(graph.run(env, "static")?.into_result()?);
    }

    Ok(report)
}

/// Builds once, then serves the project and rebuilds on every change until
/// the process is terminated.
#[cfg(feature = "live")]
pub fn develop(graph: &TaskGraph, env: &Environment) -> Result<(), ShikakeError> {
    match build(graph, env) {
        Ok(report) => tracing::info!("initial build done\n{report}"),
        Err(e) => tracing::error!("initial build failed, watching anyway\n{e}"),
    }

    let rules = watch_targets(env).map_err(crate::error::WatchError::from)?;
    crate::engine::watch(graph, env, &rules)?;
    Ok(())
}

/// Which tasks rerun when a source changes.
pub fn watch_targets(env: &Environment) -> Result<Vec<WatchRule>, FileSetError> {
    let images = env.paths.source(Category::Images);
    let styles = env.paths.source(Category::Styles);
    let scripts = env.paths.source(Category::Scripts);

    Ok(vec![
        WatchRule::new(file_set(env, &images, images::patterns(env))?, &["images"]),
        WatchRule::new(file_set(env, &styles, styles::LESS)?, &["styles:less"]),
        WatchRule::new(file_set(env, &styles, styles::SASS)?, &["styles:sass"]),
        WatchRule::new(file_set(env, &styles, styles::PLAIN)?, &["styles:postcss"]),
        WatchRule::new(file_set(env, &scripts, ["**/*.js"])?, &["scripts"]),
        WatchRule::reload(file_set(
            env,
            &env.config.paths.root,
            &env.config.watch.reload,
        )?),
    ])
}

/// Builds a file set from patterns relative to `dir`. A leading `!` marks an
/// exclusion.
pub(crate) fn file_set<I, S>(
    env: &Environment,
    dir: impl AsRef<Utf8Path>,
    patterns: I,
) -> Result<FileSet, FileSetError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let dir = dir.as_ref();
    FileSet::new(
        patterns
            .into_iter()
            .map(|pattern| rooted(env, dir, pattern.as_ref())),
    )
}

fn rooted(env: &Environment, dir: &Utf8Path, pattern: &str) -> String {
    match pattern.strip_prefix('!') {
        Some(negated) => env.exclude(dir, negated),
        None => env.glob(dir, pattern),
    }
}

/// Copies the matched files into the root of the generated theme.
fn promote(env: &Environment, sources: &FileSet) -> anyhow::Result<()> {
    use anyhow::Context;

    let root = env.locate(env.paths.project_root());
    for entry in sources.entries()? {
        let to = root.join(entry.relative());
        crate::io::copy_file(&entry.path, &to)
            .with_context(|| format!("couldn't copy {} to {}", entry.path, to))?;
        tracing::debug!(file = %to, "moved to root");
    }

    Ok(())
}

/// Deletes the matched files.
fn remove(sources: &FileSet) -> anyhow::Result<()> {
    use anyhow::Context;

    for entry in sources.entries()? {
        crate::io::remove_path(&entry.path)
            .with_context(|| format!("couldn't delete {}", entry.path))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::engine::Outcome;
    use crate::io::write_file;
    use crate::reload::LiveReload;
    use crate::testing;

    fn files(dir: &Utf8Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    fn png(path: &Utf8Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbImage::from_pixel(16, 16, image::Rgb([200, 40, 40]))
            .save(path)
            .unwrap();
    }

    /// Moves the modification time into the future, so the file reads as
    /// edited after anything written during the test.
    fn bump(path: &Utf8Path) {
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    #[test]
    fn test_graph_is_valid() {
        for profile in [Profile::Development, Profile::Production] {
            let graph = tasks(profile).unwrap();
            assert!(graph.contains("static"));
            assert_eq!(
                graph.prerequisites("styles:root").unwrap(),
                vec!["styles:less", "styles:sass", "styles:postcss", "styles:vendor"]
            );
            assert_eq!(
                graph.prerequisites("scripts").unwrap(),
                vec!["scripts:local", "scripts:vendor"]
            );
        }

        let dev = tasks(Profile::Development).unwrap();
        let prod = tasks(Profile::Production).unwrap();
        assert_eq!(dev.prerequisites("clean").unwrap(), vec!["clean:dev"]);
        assert_eq!(
            prod.prerequisites("clean").unwrap(),
            vec!["clean:cache", "clean:prod"]
        );
    }

    #[test]
    fn test_dev_sass_writes_one_stylesheet() {
        let (_dir, env, notes) = testing::environment(Profile::Development);
        write_file(&env.locate("src/styles/main.scss"), ".a { color: red; }\n").unwrap();

        let graph = tasks(Profile::Development).unwrap();
        let report = graph.run(&env, "styles:sass").unwrap();
        assert!(report.is_success());

        let dest = env.locate(env.paths.destination(Category::Styles));
        assert_eq!(files(&dest), vec!["main.css", "main.css.map"]);

        let css = fs::read_to_string(dest.join("main.css")).unwrap();
        assert!(css.starts_with("/* prefixed */\n.a {"));
        assert!(css.ends_with("/*# sourceMappingURL=main.css.map */\n"));

        assert!(notes.take().is_empty());
        assert!(!env.cache.dir().exists());
    }

    #[test]
    fn test_dev_rerun_skips_unchanged() {
        let (_dir, env, _) = testing::environment(Profile::Development);
        write_file(&env.locate("src/styles/main.scss"), ".a { color: red; }\n").unwrap();

        let graph = tasks(Profile::Development).unwrap();
        graph.run(&env, "styles:sass").unwrap();

        let output = env.locate("assets/css/main.css");
        fs::write(&output, "sentinel").unwrap();

        graph.run(&env, "styles:sass").unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "sentinel");
    }

    #[test]
    fn test_dev_partial_edit_rebuilds_importers() {
        let (_dir, env, _) = testing::environment(Profile::Development);
        let vars = env.locate("src/styles/_vars.scss");
        write_file(&vars, "$c: red;\n").unwrap();
        write_file(
            &env.locate("src/styles/main.scss"),
            "@import 'vars';\n.a { color: $c; }\n",
        )
        .unwrap();

        let graph = tasks(Profile::Development).unwrap();
        assert!(graph.run(&env, "styles:sass").unwrap().is_success());

        let output = env.locate("assets/css/main.css");
        assert!(fs::read_to_string(&output).unwrap().contains("color: red"));

        write_file(&vars, "$c: blue;\n").unwrap();
        bump(&vars);
        assert!(graph.run(&env, "styles:sass").unwrap().is_success());

        assert!(fs::read_to_string(&output).unwrap().contains("color: blue"));
        assert_eq!(
            files(&env.locate("assets/css")),
            vec!["main.css", "main.css.map"]
        );
    }

    #[test]
    fn test_dev_images_rerun_skips_unchanged() {
        let (_dir, env, _) = testing::environment(Profile::Development);
        let (reload, signals) = LiveReload::channel(env.locate("."));
        let env = env.with_reload(reload);
        png(&env.locate("src/images/a.png"));

        let graph = tasks(Profile::Development).unwrap();
        assert!(graph.run(&env, "images:optimize").unwrap().is_success());
        assert_eq!(signals.try_iter().count(), 1);

        let output = env.locate("assets/images/a.png");
        fs::write(&output, "sentinel").unwrap();

        assert!(graph.run(&env, "images:optimize").unwrap().is_success());
        assert_eq!(fs::read_to_string(&output).unwrap(), "sentinel");
        assert_eq!(signals.try_iter().count(), 0);
    }

    #[test]
    fn test_watched_lint_reports_every_broken_file() {
        for (watched, reported) in [(false, 1), (true, 2)] {
            let (_dir, env, notes) = testing::environment(Profile::Development);
            write_file(&env.locate("src/scripts/a.js"), "undefinedThing();\n").unwrap();
            write_file(&env.locate("src/scripts/b.js"), "undefinedThing();\n").unwrap();

            let (reload, _signals) = LiveReload::channel(env.locate("."));
            let env = match watched {
                true => env.with_reload(reload),
                false => env,
            };

            let graph = tasks(Profile::Development).unwrap();
            let report = graph.run(&env, "scripts:lint").unwrap();
            assert_eq!(report.outcome("scripts:lint"), Some(Outcome::Failed));

            let notes = notes.take();
            assert_eq!(notes.len(), 1);
            let named = ["/a.js", "/b.js"]
                .iter()
                .filter(|file| notes[0].message.contains(**file))
                .count();
            assert_eq!(named, reported, "watched: {watched}");
        }
    }

    #[test]
    fn test_prod_scripts() {
        let (_dir, env, notes) = testing::environment(Profile::Production);
        let app = env.locate("src/scripts/app.js");
        let vendor = env.locate("src/scripts/vendor.min.js");
        write_file(&app, "var a = 1\n").unwrap();
        write_file(&vendor, "var v=1").unwrap();

        let graph = tasks(Profile::Production).unwrap();
        let report = graph.run(&env, "scripts").unwrap();
        assert!(report.is_success(), "{report}");

        // fixed in place, vendor files are never linted
        assert_eq!(fs::read_to_string(&app).unwrap(), "const a = 1;\n");
        assert_eq!(fs::read_to_string(&vendor).unwrap(), "var v=1");

        let dest = env.locate("dist/assets/js");
        assert_eq!(files(&dest), vec!["app.js", "app.js.map", "vendor.min.js"]);

        let js = fs::read_to_string(dest.join("app.js")).unwrap();
        assert!(js.starts_with("/* min */\n/* transpiled */\nconst a = 1;"));
        assert!(js.ends_with("//# sourceMappingURL=app.js.map\n"));
        assert_eq!(
            fs::read_to_string(dest.join("vendor.min.js")).unwrap(),
            "var v=1"
        );

        assert!(notes.take().is_empty());
    }

    #[test]
    fn test_lint_failure_skips_dependents() {
        let (_dir, env, notes) = testing::environment(Profile::Development);
        write_file(&env.locate("src/scripts/bad.js"), "undefinedThing();\n").unwrap();
        write_file(&env.locate("src/scripts/lib.min.js"), "x()").unwrap();

        let graph = tasks(Profile::Development).unwrap();
        let report = graph.run(&env, "scripts").unwrap();

        assert_eq!(report.outcome("scripts:lint"), Some(Outcome::Failed));
        assert_eq!(report.outcome("scripts:vendor"), Some(Outcome::Succeeded));
        assert_eq!(report.skipped(), vec!["scripts", "scripts:local"]);
        assert!(!env.locate("assets/js/bad.js").exists());
        assert!(env.locate("assets/js/lib.min.js").exists());
        assert!(!notes.take().is_empty());

        assert!(matches!(
            report.into_result(),
            Err(crate::BuildError::Task(name, _)) if name == "scripts:lint"
        ));
    }

    #[test]
    fn test_movers_leave_no_copies() {
        let (_dir, env, _) = testing::environment(Profile::Development);
        write_file(&env.locate("src/styles/style.scss"), "body { margin: 0; }\n").unwrap();
        write_file(&env.locate("src/styles/rtl.css"), "body { direction: rtl; }\n").unwrap();
        write_file(&env.locate("src/styles/main.scss"), ".a { color: red; }\n").unwrap();
        png(&env.locate("src/images/screenshot.png"));

        let graph = tasks(Profile::Development).unwrap();
        let report = graph.run_all(&env, &["styles", "images"]).unwrap();
        assert!(report.is_success(), "{report}");

        for file in ["style.css", "style.css.map", "rtl.css", "rtl.css.map", "screenshot.png"] {
            assert!(env.locate(file).is_file(), "{file} not moved");
        }

        assert_eq!(
            files(&env.locate("assets/css")),
            vec!["main.css", "main.css.map"]
        );
        assert!(files(&env.locate("assets/images")).is_empty());
    }

    #[test]
    fn test_prod_images_bypass_cache() {
        let (_dir, env, _) = testing::environment(Profile::Production);
        png(&env.locate("src/images/icons/a.png"));

        let graph = tasks(Profile::Production).unwrap();
        assert!(graph.run(&env, "images").unwrap().is_success());

        assert!(env.locate("dist/assets/images/icons/a.png").is_file());
        assert!(!env.cache.dir().exists());
    }

    #[test]
    fn test_clean() {
        let (_dir, env, _) = testing::environment(Profile::Development);
        for file in ["assets/css/a.css", "style.css", "dist/index.php", "index.php"] {
            write_file(&env.locate(file), "").unwrap();
        }

        let graph = tasks(Profile::Development).unwrap();
        assert!(graph.run(&env, "clean").unwrap().is_success());

        assert!(!env.locate("assets").exists());
        assert!(!env.locate("style.css").exists());
        // development never touches the production output
        assert!(env.locate("dist/index.php").exists());
        assert!(env.locate("index.php").exists());

        let graph = tasks(Profile::Production).unwrap();
        write_file(&env.cache.dir().join("x.bin"), "").unwrap();
        assert!(graph.run(&env, "clean").unwrap().is_success());
        assert!(!env.locate("dist").exists());
        assert!(!env.cache.dir().exists());
    }

    #[test]
    fn test_static_copies_theme_files() {
        let (_dir, env, _) = testing::environment(Profile::Production);
        let kept = ["index.php", "inc/helpers.php", "languages/theme.pot"];
        let skipped = [
            ".editorconfig",
            ".git/config",
            "_drafts/old.php",
            "src/styles/a.scss",
            "node_modules/pkg/index.js",
            "assets/css/a.css",
            "package.json",
            "README.md",
            "style.css",
            "screenshot.png",
        ];
        for file in kept.iter().chain(&skipped) {
            write_file(&env.locate(file), file).unwrap();
        }

        let graph = tasks(Profile::Production).unwrap();
        assert!(graph.run(&env, "static").unwrap().is_success());

        let output = env.locate("dist");
        for file in kept {
            assert_eq!(fs::read_to_string(output.join(file)).unwrap(), file);
        }
        for file in skipped {
            assert!(!output.join(file).exists(), "{file} was copied");
        }
    }

    #[test]
    fn test_build_runs_clean_first() {
        let (_dir, env, _) = testing::environment(Profile::Production);
        write_file(&env.locate("dist/stale.txt"), "").unwrap();
        write_file(&env.locate("src/styles/main.scss"), ".a { color: red; }\n").unwrap();
        write_file(&env.locate("src/scripts/app.js"), "const a = 1;\n").unwrap();
        write_file(&env.locate("functions.php"), "<?php\n").unwrap();

        let graph = tasks(Profile::Production).unwrap();
        let report = build(&graph, &env).unwrap();

        assert!(report.is_success());
        assert!(!env.locate("dist/stale.txt").exists());
        assert!(env.locate("dist/functions.php").is_file());
        assert!(env.locate("dist/assets/css/main.css").is_file());
        assert!(env.locate("dist/assets/js/app.js").is_file());

        let clean = report.execution_times["clean:prod"];
        let lint = report.execution_times["scripts:lint"];
        let local = report.execution_times["scripts:local"];
        assert!(clean.start + clean.duration <= lint.start);
        assert!(lint.start + lint.duration <= local.start);
        assert_eq!(report.completed.last().map(String::as_str), Some("static"));
    }

    #[test]
    fn test_watch_targets() {
        let (_dir, env, _) = testing::environment(Profile::Development);
        let rules = watch_targets(&env).unwrap();

        let tasks_for = |file: &str| -> Vec<Vec<String>> {
            let path = env.locate(file);
            rules
                .iter()
                .filter(|rule| rule.sources.contains(&path))
                .map(|rule| rule.tasks.clone())
                .collect()
        };

        assert_eq!(tasks_for("src/styles/a/b.scss"), vec![vec!["styles:sass"]]);
        assert_eq!(tasks_for("src/styles/a.less"), vec![vec!["styles:less"]]);
        assert_eq!(tasks_for("src/styles/a.css"), vec![vec!["styles:postcss"]]);
        assert!(tasks_for("src/styles/a.min.css").is_empty());
        assert_eq!(tasks_for("src/images/a.svg"), vec![vec!["images"]]);
        assert_eq!(tasks_for("src/scripts/app.js"), vec![vec!["scripts"]]);
        assert_eq!(tasks_for("templates/header.php"), vec![Vec::<String>::new()]);
    }
}
