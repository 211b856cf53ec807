//! Image optimization.
//!
//! PNG files are re-encoded at the configured compression level with
//! adaptive filtering, SVG files lose comments and inter-tag whitespace.
//! JPEG files are only re-encoded when a quality is configured, GIF files
//! pass through. An optimized file is never larger than its source.
//!
//! In development, results are kept in an on-disk cache keyed by the hash
//! of the source bytes and the settings, so unchanged images are optimized
//! once across runs.

use std::fs::{self, File};
use std::io::{BufReader, Cursor};

use camino::Utf8PathBuf;
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use serde::{Deserialize, Serialize};

use crate::config::{ImageConfig, PngLevel};
use crate::core::Hash32;
use crate::error::StepError;
use crate::pipeline::{Asset, FileStep, StepContext};

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    ext: String,
    source: u64,
    output: u64,
}

/// Persistent store of optimized images.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: Utf8PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8PathBuf {
        &self.dir
    }

    fn paths(&self, key: Hash32) -> (Utf8PathBuf, Utf8PathBuf) {
        let hex = key.to_hex();
        (
            self.dir.join(format!("{hex}.bin")),
            self.dir.join(format!("{hex}.meta.cbor")),
        )
    }

    pub(crate) fn get(&self, key: Hash32) -> Result<Option<Vec<u8>>, StepError> {
        let (bin, meta) = self.paths(key);
        if !meta.exists() || !bin.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(&meta)?);
        let meta: CacheMeta =
            ciborium::from_reader(reader).map_err(|e| StepError::Cache(e.to_string()))?;

        let bytes = fs::read(&bin)?;
        if bytes.len() as u64 != meta.output {
            // truncated entry, optimize again
            return Ok(None);
        }

        Ok(Some(bytes))
    }

    fn put(&self, key: Hash32, bytes: &[u8], meta: &CacheMeta) -> Result<(), StepError> {
        let (bin, meta_path) = self.paths(key);
        fs::create_dir_all(&self.dir)?;
        fs::write(&bin, bytes)?;

        let file = File::create(&meta_path)?;
        ciborium::into_writer(meta, file).map_err(|e| StepError::Cache(e.to_string()))?;
        Ok(())
    }

    /// Drops every cached image. Returns whether there was anything to drop.
    pub fn clear(&self) -> std::io::Result<bool> {
        crate::io::remove_path(&self.dir)
    }
}

/// Optimizes images, optionally through an [`ImageCache`].
#[derive(Debug, Clone, Default)]
pub struct Optimize {
    cache: Option<ImageCache>,
}

impl Optimize {
    /// Optimizes every file from scratch.
    pub fn new() -> Self {
        Self { cache: None }
    }

    pub fn cached(cache: ImageCache) -> Self {
        Self { cache: Some(cache) }
    }
}

fn cache_key(bytes: &[u8], ext: &str, config: &ImageConfig) -> Hash32 {
    let settings = format!(
        "{:?}:{:?}:{}",
        config.png, config.jpeg_quality, config.minify_svg
    );
    Hash32::hash_all([bytes, ext.as_bytes(), settings.as_bytes()])
}

impl FileStep for Optimize {
    fn name(&self) -> &'static str {
        "optimize"
    }

    fn transform(&self, ctx: &StepContext, mut asset: Asset) -> Result<Option<Asset>, StepError> {
        let Some(ext) = asset.extension().map(str::to_ascii_lowercase) else {
            return Ok(Some(asset));
        };
        let config = &ctx.env.config.images;

        let output = match &self.cache {
            None => optimize(&ext, &asset.contents, config)?,
            Some(cache) => {
                let key = cache_key(&asset.contents, &ext, config);
                match cache.get(key)? {
                    Some(bytes) => {
                        tracing::trace!(file = %asset.source, "image cache hit");
                        bytes
                    }
                    None => {
                        let bytes = optimize(&ext, &asset.contents, config)?;
                        let meta = CacheMeta {
                            ext: ext.clone(),
                            source: asset.contents.len() as u64,
                            output: bytes.len() as u64,
                        };
                        cache.put(key, &bytes, &meta)?;
                        bytes
                    }
                }
            }
        };

        tracing::debug!(
            file = %asset.source,
            before = asset.contents.len(),
            after = output.len(),
            "optimized"
        );

        asset.contents = output;
        Ok(Some(asset))
    }
}

/// Optimizes a single image, keeping the source if it was already smaller.
pub fn optimize(ext: &str, bytes: &[u8], config: &ImageConfig) -> Result<Vec<u8>, StepError> {
    let output = match ext {
        "png" => optimize_png(bytes, config.png)?,
        "jpg" | "jpeg" => match config.jpeg_quality {
            Some(quality) => optimize_jpeg(bytes, quality)?,
            None => return Ok(bytes.to_vec()),
        },
        "svg" if config.minify_svg => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| StepError::Cache(format!("SVG is not valid UTF-8: {e}")))?;
            minify_svg(text).into_bytes()
        }
        _ => return Ok(bytes.to_vec()),
    };

    if output.len() < bytes.len() {
        Ok(output)
    } else {
        Ok(bytes.to_vec())
    }
}

fn optimize_png(bytes: &[u8], level: PngLevel) -> Result<Vec<u8>, StepError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;

    let compression = match level {
        PngLevel::Fast => CompressionType::Fast,
        PngLevel::Default => CompressionType::Default,
        PngLevel::Best => CompressionType::Best,
    };

    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive);
    image.write_with_encoder(encoder)?;
    Ok(out)
}

fn optimize_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, StepError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    image.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

/// Drops comments and whitespace between tags. Definitions and IDs are
/// left alone since other documents may reference them.
fn minify_svg(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<!--") {
        stripped.push_str(&rest[..start]);
        rest = match rest[start..].find("-->") {
            Some(end) => &rest[start + end + 3..],
            None => "",
        };
    }
    stripped.push_str(rest);

    let mut out = String::with_capacity(stripped.len());
    let mut pending = String::new();

    for c in stripped.trim().chars() {
        if c.is_whitespace() {
            pending.push(c);
            continue;
        }

        if !pending.is_empty() {
            if !(out.ends_with('>') && c == '<') {
                out.push_str(&pending);
            }
            pending.clear();
        }

        out.push(c);
    }

    out
}
