use std::fs;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::StepError;
use crate::pipeline::{Asset, Step, StepContext};

/// Drops files whose output is at least as new as the source.
///
/// Outputs are looked up at the same relative path under `dest`, with the
/// extension swapped when the pipeline compiles to another format.
///
/// With [`imports`](Changed::imports), any file of the batch may be pulled in
/// by any other, so an output is only fresh when it is at least as new as
/// every source in the batch. Editing a Sass partial then rebuilds the
/// stylesheets importing it.
#[derive(Debug, Clone)]
pub struct Changed {
    dest: Utf8PathBuf,
    extension: Option<String>,
    imports: bool,
}

impl Changed {
    pub fn new(dest: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            extension: None,
            imports: false,
        }
    }

    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = Some(extension.to_string());
        self
    }

    pub fn imports(mut self) -> Self {
        self.imports = true;
        self
    }

    fn output(&self, relative: &Utf8Path) -> Utf8PathBuf {
        let mut path = self.dest.join(relative);
        if let Some(extension) = &self.extension {
            path.set_extension(extension);
        }
        path
    }
}

fn modified(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

impl Step for Changed {
    fn name(&self) -> &'static str {
        "changed"
    }

    fn apply(&self, _: &StepContext, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        let newest = match self.imports {
            true => assets.iter().filter_map(|asset| modified(&asset.source)).max(),
            false => None,
        };

        let kept = assets
            .into_iter()
            .filter(|asset| {
                let source = match newest {
                    Some(newest) => Some(newest),
                    None => modified(&asset.source),
                };

                let fresh = match (source, modified(&self.output(&asset.relative))) {
                    (Some(source), Some(output)) => output >= source,
                    _ => false,
                };

                if fresh {
                    tracing::trace!(file = %asset.source, "unchanged");
                }
                !fresh
            })
            .collect();

        Ok(kept)
    }
}
