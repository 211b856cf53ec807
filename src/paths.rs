//! Resolution of source and destination directories.

use std::fmt::Display;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::PathConfig;
use crate::core::Profile;
use crate::error::ConfigError;

/// Content category handled by a dedicated pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Images,
    Styles,
    Scripts,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Images, Category::Styles, Category::Scripts];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Images => "images",
            Category::Styles => "styles",
            Category::Scripts => "scripts",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "images" => Ok(Category::Images),
            "styles" => Ok(Category::Styles),
            "scripts" => Ok(Category::Scripts),
            other => Err(ConfigError::UnknownCategory(other.to_string())),
        }
    }
}

/// Whether a path is read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Source,
    Destination,
}

impl FromStr for Direction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" | "src" => Ok(Direction::Source),
            "destination" | "dist" => Ok(Direction::Destination),
            other => Err(ConfigError::UnknownDirection(other.to_string())),
        }
    }
}

/// Computes the directories each category reads from and writes to.
///
/// Sources always live under the entry root. Destinations depend on the
/// profile: production writes into the staging output tree, development
/// writes straight into the project tree so a local server can serve it.
///
/// The returned paths are relative to the working directory and built purely
/// from the configuration and the profile.
#[derive(Debug, Clone)]
pub struct PathResolver {
    profile: Profile,
    paths: PathConfig,
}

impl PathResolver {
    pub fn new(profile: Profile, paths: PathConfig) -> Self {
        Self { profile, paths }
    }

    pub fn resolve(&self, category: Category, direction: Direction) -> Utf8PathBuf {
        match direction {
            Direction::Source => {
                Utf8Path::new(&self.paths.entry).join(self.paths.dev.get(category))
            }
            Direction::Destination => self
                .project_root()
                .join(&self.paths.prod.root)
                .join(self.paths.prod.get(category)),
        }
    }

    pub fn source(&self, category: Category) -> Utf8PathBuf {
        self.resolve(category, Direction::Source)
    }

    pub fn destination(&self, category: Category) -> Utf8PathBuf {
        self.resolve(category, Direction::Destination)
    }

    /// Root of the generated theme: the output directory in production,
    /// the project root in development.
    pub fn project_root(&self) -> Utf8PathBuf {
        if self.profile.is_production() {
            Utf8PathBuf::from(&self.paths.output)
        } else {
            Utf8PathBuf::from(&self.paths.root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(profile: Profile) -> PathResolver {
        PathResolver::new(profile, PathConfig::default())
    }

    #[test]
    fn test_source_ignores_profile() {
        for category in Category::ALL {
            let dev = resolver(Profile::Development).source(category);
            let prod = resolver(Profile::Production).source(category);
            assert_eq!(dev, prod);
        }

        assert_eq!(
            resolver(Profile::Production).source(Category::Styles),
            Utf8Path::new("src/styles")
        );
    }

    #[test]
    fn test_destination_depends_on_profile() {
        let dev = resolver(Profile::Development);
        let prod = resolver(Profile::Production);

        assert_eq!(
            dev.destination(Category::Styles),
            Utf8Path::new("./assets/css")
        );
        assert_eq!(
            prod.destination(Category::Styles),
            Utf8Path::new("dist/assets/css")
        );
        assert_eq!(
            prod.destination(Category::Scripts),
            Utf8Path::new("dist/assets/js")
        );
        assert_eq!(
            dev.destination(Category::Images),
            Utf8Path::new("./assets/images")
        );

        for category in Category::ALL {
            assert_ne!(dev.destination(category), prod.destination(category));
        }
    }

    #[test]
    fn test_deterministic() {
        let resolver = resolver(Profile::Production);
        for category in Category::ALL {
            for direction in [Direction::Source, Direction::Destination] {
                assert_eq!(
                    resolver.resolve(category, direction),
                    resolver.resolve(category, direction)
                );
            }
        }
    }

    #[test]
    fn test_project_root() {
        assert_eq!(
            resolver(Profile::Production).project_root(),
            Utf8Path::new("dist")
        );
        assert_eq!(
            resolver(Profile::Development).project_root(),
            Utf8Path::new(".")
        );
    }

    #[test]
    fn test_parse_category() {
        assert_eq!("scripts".parse::<Category>().unwrap(), Category::Scripts);
        assert!(matches!(
            "fonts".parse::<Category>(),
            Err(ConfigError::UnknownCategory(name)) if name == "fonts"
        ));
        assert!(matches!(
            "upload".parse::<Direction>(),
            Err(ConfigError::UnknownDirection(_))
        ));
    }
}
