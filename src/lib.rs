//! Streaming GIF87a/GIF89a decoder.
//!
//! Bytes come in through a [`ByteSource`], pixels go out through a
//! [`RasterSink`]. [`Decoder`] walks the container, decompresses each image's
//! LZW data and places the pixels, de-interlacing as it goes.
//!
//! ```no_run
//! use gifraster::{DecodeOptions, Decoder, Frames, ImageSelection};
//!
//! # fn main() -> anyhow::Result<()> {
//! let file = std::fs::File::open("animation.gif")?;
//! let options = DecodeOptions::new().image(ImageSelection::All);
//! let mut decoder = Decoder::from_reader(std::io::BufReader::new(file), options);
//!
//! let mut frames = Frames::new();
//! decoder.decode(&mut frames)?;
//! println!("decoded {} images", frames.rasters().len());
//! # Ok(())
//! # }
//! ```

mod parser;
pub mod ppm_writer;
pub mod sink;
pub mod source;

pub use parser::{
    ColorTable, DecodeOptions, Decoder, DisposalMethod, GraphicControl, ImageDescriptor, ImageRecord,
    ImageSelection, LogicalScreenDescriptor, ParserError, Rgb, Version, MAX_COLOR_TABLE_SIZE,
};
pub use sink::{ColorModel, Frames, Raster, RasterSink};
pub use source::{ByteSource, StreamSource};
