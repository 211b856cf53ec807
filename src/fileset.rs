//! Glob-matched file sets.
//!
//! A [`FileSet`] is a list of glob patterns evaluated when a task runs.
//! Patterns prefixed with `!` exclude matches of the other patterns, which is
//! how already-processed files (e.g. `*.min.css`) are kept out of a pipeline.
//!
//! Every matched file remembers the *base* of the pattern that found it: the
//! literal directory in front of the first wildcard. Pipelines write outputs
//! at the same path relative to their destination, so `src/styles/a/b.scss`
//! matched by `src/styles/**/*.scss` lands at `<dest>/a/b.css`.

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern, glob_with};

use crate::error::FileSetError;

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A single file matched by a [`FileSet`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    pub path: Utf8PathBuf,
    pub base: Utf8PathBuf,
}

impl Entry {
    /// Path relative to the base of the pattern that matched it.
    pub fn relative(&self) -> &Utf8Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone)]
struct Include {
    glob: String,
    base: Utf8PathBuf,
    pattern: Pattern,
}

#[derive(Debug, Clone, Default)]
pub struct FileSet {
    include: Vec<Include>,
    exclude: Vec<Pattern>,
}

impl FileSet {
    pub fn new<I, S>(patterns: I) -> Result<Self, FileSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = FileSet::default();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compile =
                |p: &str| Pattern::new(p).map_err(|e| FileSetError::Pattern(p.to_string(), e));

            match pattern.strip_prefix('!') {
                Some(negated) => set.exclude.push(compile(negated)?),
                None => set.include.push(Include {
                    glob: pattern.to_string(),
                    base: glob_base(pattern),
                    pattern: compile(pattern)?,
                }),
            }
        }

        Ok(set)
    }

    /// The literal roots of all positive patterns.
    pub fn roots(&self) -> impl Iterator<Item = &Utf8Path> {
        self.include.iter().map(|include| include.base.as_path())
    }

    /// Checks a path against the set without touching the file system.
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.include
            .iter()
            .any(|include| include.pattern.matches_path_with(path.as_std_path(), OPTIONS))
            && !self.is_excluded(path)
    }

    fn is_excluded(&self, path: &Utf8Path) -> bool {
        self.exclude
            .iter()
            .any(|pattern| pattern.matches_path_with(path.as_std_path(), OPTIONS))
    }

    /// Lists the regular files currently matching the set, sorted by path.
    pub fn entries(&self) -> Result<Vec<Entry>, FileSetError> {
        let mut entries: Vec<Entry> = Vec::new();

        for include in &self.include {
            let paths = glob_with(&include.glob, OPTIONS)
                .map_err(|e| FileSetError::Pattern(include.glob.clone(), e))?;

            for path in paths {
                // Handle glob errors immediately here
                let path = Utf8PathBuf::try_from(path?)?;

                if !path.is_file() || self.is_excluded(&path) {
                    continue;
                }

                if entries.iter().any(|entry| entry.path == path) {
                    continue;
                }

                entries.push(Entry {
                    path,
                    base: include.base.clone(),
                });
            }
        }

        entries.sort();
        Ok(entries)
    }
}

/// Splits off the literal directory in front of the first wildcard. A
/// pattern without wildcards names a single file, its base is the parent.
pub(crate) fn glob_base(pattern: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(pattern);

    let components: Vec<_> = path.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    if split_idx == components.len() {
        return path.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
    }

    components.iter().take(split_idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup(files: &[&str]) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        for file in files {
            crate::io::write_file(&root.join(file), "x").unwrap();
        }
        (dir, root)
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/styles/**/*.scss"), "src/styles");
        assert_eq!(glob_base("/srv/src/*.js"), "/srv/src");
        assert_eq!(glob_base("assets/images/screenshot.png"), "assets/images");
        assert_eq!(glob_base("*.css"), "");
    }

    #[test]
    fn test_negation_excludes_minified() {
        let (_dir, root) = setup(&[
            "styles/main.css",
            "styles/vendor.min.css",
            "styles/nested/extra.css",
            "styles/nested/lib.min.css",
        ]);

        let set = FileSet::new([
            format!("{root}/styles/**/*.css"),
            format!("!{root}/styles/*.min.css"),
            format!("!{root}/styles/**/*.min.css"),
        ])
        .unwrap();

        let relative: Vec<_> = set
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.relative().to_string())
            .collect();

        assert_eq!(relative, vec!["main.css", "nested/extra.css"]);
    }

    #[test]
    fn test_skips_dotfiles_and_directories() {
        let (_dir, root) = setup(&["a.txt", ".hidden", "sub/b.txt", ".git/config"]);
        fs::create_dir_all(root.join("empty")).unwrap();

        let set = FileSet::new([format!("{root}/**/*")]).unwrap();
        let relative: Vec<_> = set
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.relative().to_string())
            .collect();

        assert_eq!(relative, vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_literal_file_and_dedup() {
        let (_dir, root) = setup(&["images/screenshot.png", "images/logo.png"]);

        let set = FileSet::new([
            format!("{root}/images/screenshot.png"),
            format!("{root}/images/*.png"),
        ])
        .unwrap();

        let entries = set.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.base == root.join("images")));
    }

    #[test]
    fn test_contains() {
        let set = FileSet::new(["/p/src/scripts/**/*.js", "!/p/src/scripts/**/*.min.js"]).unwrap();

        assert!(set.contains(Utf8Path::new("/p/src/scripts/app.js")));
        assert!(set.contains(Utf8Path::new("/p/src/scripts/a/b.js")));
        assert!(!set.contains(Utf8Path::new("/p/src/scripts/a/b.min.js")));
        assert!(!set.contains(Utf8Path::new("/p/src/styles/app.js")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            FileSet::new(["src/[a"]),
            Err(FileSetError::Pattern(..))
        ));
    }
}
