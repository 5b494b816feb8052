mod bit_reader;
mod color_table;
mod decoder;
mod lzw;
mod raster;

pub use color_table::{ColorTable, Rgb, MAX_COLOR_TABLE_SIZE};
pub use decoder::{Decoder, ImageRecord, LogicalScreenDescriptor, Version};

use crate::source::ByteSource;

use thiserror::Error;

use std::io::ErrorKind;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalMethod {
    Unspecified = 0,
    DoNotDispose = 1,
    RestoreToBackgroundColor = 2,
    RestoreToPrevious = 3,
}

impl DisposalMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DisposalMethod::Unspecified),
            1 => Some(DisposalMethod::DoNotDispose),
            2 => Some(DisposalMethod::RestoreToBackgroundColor),
            3 => Some(DisposalMethod::RestoreToPrevious),
            _ => None,
        }
    }
}

/// Contents of a graphic control extension.
///
/// Applies to the next image only. The decoder drops it once that image has
/// been read, so a later image without its own extension has no transparent
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicControl {
    /// `None` for the reserved values 4-7.
    pub disposal_method: Option<DisposalMethod>,
    pub user_input_flag: bool,
    /// Hundredths of a second.
    pub delay_time: u16,
    pub transparent_color_index: Option<u8>,
}

impl GraphicControl {
    /// Parses the first sub-block of the extension, which must hold at least
    /// 4 bytes.
    pub(crate) fn parse(block: &[u8]) -> Result<Self, ParserError> {
        if block.len() < 4 {
            return Err(ParserError::GraphicControlTooShort(block.len()));
        }

        // packed fields: XXXYYYZW
        // XXX = reserved, YYY = disposal method, Z = user input, W = transparent color flag
        let packed_fields = block[0];
        let disposal_method = DisposalMethod::from_u8((packed_fields >> 2) & 0b00000111);
        let user_input_flag = packed_fields & 0b00000010 != 0;
        let transparent_color_flag = packed_fields & 0b00000001 != 0;

        let delay_time = u16::from_le_bytes([block[1], block[2]]);
        let transparent_color_index = transparent_color_flag.then_some(block[3]);

        Ok(Self {
            disposal_method,
            user_input_flag,
            delay_time,
            transparent_color_index,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    // positions are recorded but rasters always start at 0,0
    pub left_position: u16,
    pub top_position: u16,

    pub width: u16,
    pub height: u16,

    pub interlace_flag: bool,
    pub sort_flag: bool,
    /// Number of entries in the local color table, if the image carries one.
    pub local_color_table_size: Option<usize>,
}

impl ImageDescriptor {
    pub(crate) fn parse(buf: &[u8; 9]) -> Self {
        let packed_fields = buf[8];

        let local_color_table_flag = packed_fields & 0b10000000 != 0;
        let interlace_flag = packed_fields & 0b01000000 != 0;
        let sort_flag = packed_fields & 0b00100000 != 0;
        let local_color_table_size =
            local_color_table_flag.then(|| 1usize << ((packed_fields & 0b00000111) + 1));

        Self {
            left_position: u16::from_le_bytes([buf[0], buf[1]]),
            top_position: u16::from_le_bytes([buf[2], buf[3]]),
            width: u16::from_le_bytes([buf[4], buf[5]]),
            height: u16::from_le_bytes([buf[6], buf[7]]),
            interlace_flag,
            sort_flag,
            local_color_table_size,
        }
    }
}

/// Which images of a stream are sent to the raster sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSelection {
    /// Zero-based sequence number of the single image to render.
    Index(usize),
    All,
}

impl Default for ImageSelection {
    fn default() -> Self {
        ImageSelection::Index(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    pub image: ImageSelection,
    /// Keep parsing to the stream terminator after the requested image.
    pub drain_stream: bool,
    /// Emit `place_alpha` for every pixel.
    pub track_alpha: bool,
    /// Report stream structure at `info` level instead of `debug`.
    pub verbose: bool,
    /// Log comment extensions at `info` level.
    pub show_comments: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            image: ImageSelection::default(),
            drain_stream: true,
            track_alpha: false,
            verbose: false,
            show_comments: false,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, image: ImageSelection) -> Self {
        self.image = image;
        self
    }

    pub fn drain_stream(mut self, drain_stream: bool) -> Self {
        self.drain_stream = drain_stream;
        self
    }

    pub fn track_alpha(mut self, track_alpha: bool) -> Self {
        self.track_alpha = track_alpha;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn show_comments(mut self, show_comments: bool) -> Self {
        self.show_comments = show_comments;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("signature is invalid, the stream does not start with 'GIF'")]
    InvalidSignature,

    #[error("version {0} in the header is unsupported, expected '87a' or '89a'")]
    UnsupportedVersion(String),

    #[error("stream ends while reading the {what} at offset {offset}")]
    Truncated { what: &'static str, offset: u64 },

    #[error("stream ends inside the data portion of a {length} byte sub-block at offset {offset}")]
    TruncatedSubBlock { length: u8, offset: u64 },

    #[error("invalid minimum code size {0} in image data, the largest allowed is 8")]
    InvalidMinCodeSize(u8),

    #[error("graphic control extension first sub-block is {0} bytes, it must be at least 4")]
    GraphicControlTooShort(usize),

    #[error("image uses the global color table but the stream has none")]
    MissingColorTable,

    #[error("premature end of stream inside image data, no end code was found")]
    PrematureEndOfStream,

    #[error("not enough raster data to fill {width} x {height} image, ran out in row {row}")]
    NotEnoughRasterData { width: u16, height: u16, row: u16 },

    #[error("lzw string table contains a loop while expanding code {code}")]
    LzwStringLoop { code: u16 },

    #[error("first code after a clear code is {code}, expected a data element below {clear_code}")]
    FirstCodeNotDirect { code: u16, clear_code: u16 },

    #[error("lzw expansion stack overflow")]
    StackOverflow,

    #[error("invalid color index {index} in an image that has only {table_size} colors in the color table")]
    InvalidColorIndex { index: u8, table_size: usize },

    #[error("requested image {requested} but only {found} image(s) found in the stream")]
    ImageNotFound { requested: usize, found: usize },
}

/// Fills `buf` from the stream; running out of input is a
/// [`ParserError::Truncated`] naming `what` was being read.
pub(crate) fn read_field<S: ByteSource>(source: &mut S, buf: &mut [u8], what: &'static str) -> anyhow::Result<()> {
    let offset = source.position();
    source.read_exact(buf).map_err(|err| -> anyhow::Error {
        match err.kind() {
            ErrorKind::UnexpectedEof => ParserError::Truncated { what, offset }.into(),
            _ => err.into(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{DisposalMethod, GraphicControl, ImageDescriptor, ParserError};

    #[test]
    fn graphic_control_with_transparency() {
        // disposal 2, user input, transparent flag; delay 10; index 7
        let control = GraphicControl::parse(&[0b0000_1011, 10, 0, 7]).unwrap();
        assert_eq!(control.disposal_method, Some(DisposalMethod::RestoreToBackgroundColor));
        assert!(control.user_input_flag);
        assert_eq!(control.delay_time, 10);
        assert_eq!(control.transparent_color_index, Some(7));
    }

    #[test]
    fn graphic_control_without_transparency_flag_ignores_index() {
        let control = GraphicControl::parse(&[0b0001_1100, 0x34, 0x12, 7, 0xaa]).unwrap();
        assert_eq!(control.disposal_method, None);
        assert!(!control.user_input_flag);
        assert_eq!(control.delay_time, 0x1234);
        assert_eq!(control.transparent_color_index, None);
    }

    #[test]
    fn graphic_control_too_short() {
        assert_eq!(
            GraphicControl::parse(&[0, 0, 0]),
            Err(ParserError::GraphicControlTooShort(3))
        );
    }

    #[test]
    fn image_descriptor_fields() {
        let descriptor = ImageDescriptor::parse(&[1, 0, 2, 0, 0x40, 0x01, 3, 0, 0b1100_0010]);
        assert_eq!(descriptor.left_position, 1);
        assert_eq!(descriptor.top_position, 2);
        assert_eq!(descriptor.width, 320);
        assert_eq!(descriptor.height, 3);
        assert!(descriptor.interlace_flag);
        assert!(!descriptor.sort_flag);
        assert_eq!(descriptor.local_color_table_size, Some(8));
    }

    #[test]
    fn image_descriptor_without_local_table() {
        let descriptor = ImageDescriptor::parse(&[0, 0, 0, 0, 2, 0, 2, 0, 0b0000_0111]);
        assert!(!descriptor.interlace_flag);
        assert_eq!(descriptor.local_color_table_size, None);
    }
}
