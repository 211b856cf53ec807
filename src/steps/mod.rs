//! Pipeline steps.

pub mod changed;
pub mod css;
pub mod dest;
pub mod image;
pub mod js;
pub mod lint;
pub mod sourcemap;

pub use changed::Changed;
pub use css::{Less, MinifyCss, Prefix, Sass};
pub use dest::{Dest, Stream};
pub use image::{ImageCache, Optimize};
pub use js::{MinifyJs, Transpile};
pub use lint::{FailMode, Lint};
pub use sourcemap::{SourceMapInit, SourceMapWrite};
