use crate::error::StepError;
use crate::pipeline::{Asset, FileStep, SourceMap, StepContext};

/// Starts tracking sources: every file is mapped onto itself.
#[derive(Debug, Clone, Default)]
pub struct SourceMapInit;

impl SourceMapInit {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for SourceMapInit {
    fn name(&self) -> &'static str {
        "sourcemaps:init"
    }

    fn transform(&self, _: &StepContext, mut asset: Asset) -> Result<Option<Asset>, StepError> {
        let map = SourceMap::identity(asset.relative.as_str(), asset.text()?);
        asset.map = Some(map);
        Ok(Some(asset))
    }
}

/// Serializes the current map into a sidecar and links it from the file.
///
/// The sidecar is written by [`Dest`](super::Dest) as `<file>.map`.
#[derive(Debug, Clone, Default)]
pub struct SourceMapWrite;

impl SourceMapWrite {
    pub fn new() -> Self {
        Self
    }
}

impl FileStep for SourceMapWrite {
    fn name(&self) -> &'static str {
        "sourcemaps:write"
    }

    fn transform(&self, _: &StepContext, mut asset: Asset) -> Result<Option<Asset>, StepError> {
        let Some(mut map) = asset.map.take() else {
            return Ok(Some(asset));
        };

        let file = asset.file_name().to_string();
        map.file = Some(file.clone());

        let comment = match asset.extension() {
            Some("css") => format!("\n/*# sourceMappingURL={file}.map */\n"),
            _ => format!("\n//# sourceMappingURL={file}.map\n"),
        };

        let mut text = asset.text()?.trim_end().to_string();
        text.push_str(&comment);

        asset.sidecar = Some(map.to_json()?);
        asset.set_text(text);
        Ok(Some(asset))
    }
}
