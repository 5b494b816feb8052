use super::bit_reader::{read_sub_block, skip_through_eod, SubBlock, MAX_SUB_BLOCK_LEN};
use super::lzw::{Decompressor, Lzw};
use super::raster::{Cursor, RasterAssembler};
use super::{
    read_field, ColorTable, DecodeOptions, GraphicControl, ImageDescriptor, ImageSelection, ParserError,
};

use crate::sink::RasterSink;
use crate::source::{ByteSource, StreamSource};

use anyhow::{Context, Result};
use log::{debug, info, log, warn, Level};

use std::io::prelude::*;

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const COMMENT_EXTENSION: u8 = 0xfe;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;
const PLAIN_TEXT_EXTENSION: u8 = 0x01;

// aspect ratio byte meaning square pixels, (49 + 15) / 64 = 1
const SQUARE_ASPECT_RATIO: u8 = 49;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtensionType {
    Application,
    Comment,
    GraphicControl,
    PlainText,
    Unknown(u8),
}

impl From<u8> for ExtensionType {
    fn from(value: u8) -> Self {
        match value {
            APPLICATION_EXTENSION => ExtensionType::Application,
            COMMENT_EXTENSION => ExtensionType::Comment,
            GRAPHIC_CONTROL_EXTENSION => ExtensionType::GraphicControl,
            PLAIN_TEXT_EXTENSION => ExtensionType::PlainText,
            label => ExtensionType::Unknown(label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V87a,
    V89a,
}

impl TryFrom<&[u8]> for Version {
    type Error = ParserError;

    fn try_from(value: &[u8]) -> std::result::Result<Self, Self::Error> {
        match value {
            b"87a" => Ok(Version::V87a),
            b"89a" => Ok(Version::V89a),
            version => Err(ParserError::UnsupportedVersion(String::from_utf8_lossy(version).into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalScreenDescriptor {
    pub screen_width: u16,
    pub screen_height: u16,
    pub global_color_table_flag: bool,
    pub color_resolution: u8,
    pub sort_flag: bool,
    /// Number of entries in the global color table, if the stream has one.
    pub global_color_table_size: Option<usize>,
    pub background_color_index: u8,
    pub pixel_aspect_ratio: u8,
}

/// What the decoder learned about one image of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub descriptor: ImageDescriptor,
    pub graphic_control: Option<GraphicControl>,
    /// Sent to the raster sink, as opposed to decoded only to get past it.
    pub rendered: bool,
}

#[derive(Debug)]
enum ParserState {
    ProcessMagic,
    ProcessLogicalScreenDescriptor,
    ProcessGlobalColorTable(usize),
    ProcessTrailer,

    DetermineNextBlock,
    ProcessExtension(u8),
    ProcessImageDescriptor,
    ProcessLocalColorTable(ImageDescriptor, usize),
    ProcessImageData(ImageDescriptor, Option<ColorTable>),

    Done,
}

/// Streaming GIF decoder.
///
/// Reads the container from a [`ByteSource`] and hands the selected images
/// to a [`RasterSink`]. Any failure aborts the whole decode; the image being
/// decoded at that point is never committed to the sink.
#[derive(Debug)]
pub struct Decoder<S> {
    source: S,
    options: DecodeOptions,
    version: Option<Version>,
    logical_screen_descriptor: Option<LogicalScreenDescriptor>,
    global_color_table: Option<ColorTable>,
    // graphic control waiting for the image it applies to
    graphic_control: Option<GraphicControl>,
    comments: Vec<Box<[u8]>>,
    images: Vec<ImageRecord>,
}

impl<R: Read> Decoder<StreamSource<R>> {
    pub fn from_reader(reader: R, options: DecodeOptions) -> Self {
        Self::new(StreamSource::new(reader), options)
    }
}

impl<S: ByteSource> Decoder<S> {
    pub fn new(source: S, options: DecodeOptions) -> Self {
        Self {
            source,
            options,
            version: None,
            logical_screen_descriptor: None,
            global_color_table: None,
            graphic_control: None,
            comments: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn logical_screen_descriptor(&self) -> Option<&LogicalScreenDescriptor> {
        self.logical_screen_descriptor.as_ref()
    }

    pub fn global_color_table(&self) -> Option<&ColorTable> {
        self.global_color_table.as_ref()
    }

    /// Text of every comment extension seen so far, sub-blocks joined.
    pub fn comments(&self) -> &[Box<[u8]>] {
        &self.comments
    }

    /// Every image seen so far, rendered or not, in stream order.
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn into_source(self) -> S {
        self.source
    }

    pub fn decode<K: RasterSink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        let mut state = ParserState::ProcessMagic;

        loop {
            debug!("begin parsing state {:?}", state);

            state = self.process_next_state(state, sink)?;
            if let ParserState::Done = state {
                break Ok(());
            }
        }
    }

    // structural reports are only shown when asked for
    fn report_level(&self) -> Level {
        if self.options.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    fn process_next_state<K: RasterSink + ?Sized>(
        &mut self,
        next_state: ParserState,
        sink: &mut K,
    ) -> Result<ParserState> {
        use ParserState::*;

        match next_state {
            ProcessMagic => {
                let mut header = [0; 6];
                self.read_bytes(&mut header, "magic number")?;

                if &header[..3] != b"GIF" {
                    return Err(ParserError::InvalidSignature.into());
                }

                let version = Version::try_from(&header[3..])?;
                log!(self.report_level(), "GIF format version is {:?}", version);
                self.version = Some(version);

                Ok(ProcessLogicalScreenDescriptor)
            }
            ProcessLogicalScreenDescriptor => {
                let mut buf = [0; 7];
                self.read_bytes(&mut buf, "logical screen descriptor")?;

                let screen_width = u16::from_le_bytes([buf[0], buf[1]]);
                let screen_height = u16::from_le_bytes([buf[2], buf[3]]);

                // packed field start
                let packed_fields = buf[4];
                let global_color_table_flag = packed_fields & 0b10000000 != 0;
                let color_resolution = ((packed_fields >> 4) & 0b00000111) + 1;
                let sort_flag = packed_fields & 0b00001000 != 0;
                let global_color_table_size =
                    global_color_table_flag.then(|| 1usize << ((packed_fields & 0b00000111) + 1));
                // packed field end

                let background_color_index = buf[5];
                let pixel_aspect_ratio = buf[6];

                let level = self.report_level();
                log!(
                    level,
                    "GIF width = {} GIF height = {} pixel aspect ratio = {} ({}:1)",
                    screen_width,
                    screen_height,
                    pixel_aspect_ratio,
                    aspect_ratio(pixel_aspect_ratio)
                );
                log!(
                    level,
                    "colors = {} color resolution = {}",
                    1usize << ((packed_fields & 0b00000111) + 1),
                    color_resolution
                );

                if pixel_aspect_ratio != 0 && pixel_aspect_ratio != SQUARE_ASPECT_RATIO {
                    let ratio = aspect_ratio(pixel_aspect_ratio);
                    let (axis, factor) = if ratio < 1.0 { ('x', 1.0 / ratio) } else { ('y', ratio) };
                    warn!(
                        "input pixels are not square ({ratio}:1), rendering them as square pixels. \
                         To correct the output, scale it by {factor} along {axis}"
                    );
                }

                self.logical_screen_descriptor = Some(LogicalScreenDescriptor {
                    screen_width,
                    screen_height,
                    global_color_table_flag,
                    color_resolution,
                    sort_flag,
                    global_color_table_size,
                    background_color_index,
                    pixel_aspect_ratio,
                });

                debug!("processed logical screen descriptor, got: {:#?}", self.logical_screen_descriptor);

                let next_state = match global_color_table_size {
                    Some(size) => ProcessGlobalColorTable(size),
                    None => DetermineNextBlock,
                };

                Ok(next_state)
            }
            ProcessGlobalColorTable(size) => {
                let table = ColorTable::read(&mut self.source, size)?;
                log!(
                    self.report_level(),
                    "color table {} grays, {} colors",
                    if table.has_gray() { "contains" } else { "doesn't contain" },
                    if table.has_color() { "contains" } else { "doesn't contain" }
                );
                self.global_color_table = Some(table);

                Ok(DetermineNextBlock)
            }
            ProcessTrailer => {
                if let ImageSelection::Index(requested) = self.options.image {
                    if requested >= self.images.len() {
                        return Err(ParserError::ImageNotFound {
                            requested,
                            found: self.images.len(),
                        }
                        .into());
                    }
                }

                Ok(Done)
            }
            DetermineNextBlock => {
                let introducer_or_label = self.read_byte("block marker")?;

                match introducer_or_label {
                    // extension introducer means that a label follows determining what exact type
                    // of extension it is.
                    EXTENSION_INTRODUCER => Ok(ProcessExtension(self.read_byte("extension label")?)),
                    IMAGE_DESCRIPTOR_LABEL => Ok(ProcessImageDescriptor),
                    TRAILER_LABEL => Ok(ProcessTrailer),
                    label => {
                        warn!("bogus character 0x{label:02x}, ignoring");
                        Ok(DetermineNextBlock)
                    }
                }
            }
            ProcessExtension(label) => self.process_extension(ExtensionType::from(label)),
            ProcessImageDescriptor => {
                let mut buf = [0; 9];
                self.read_bytes(&mut buf, "image descriptor")?;
                let descriptor = ImageDescriptor::parse(&buf);

                let level = self.report_level();
                log!(
                    level,
                    "reading {} by {}{} GIF image",
                    descriptor.width,
                    descriptor.height,
                    if descriptor.interlace_flag { " interlaced" } else { "" }
                );

                let next_state = match descriptor.local_color_table_size {
                    Some(size) => {
                        log!(level, "  uses local color table of {size} colors");
                        ProcessLocalColorTable(descriptor, size)
                    }
                    None => {
                        log!(level, "  uses global color table");
                        ProcessImageData(descriptor, None)
                    }
                };

                Ok(next_state)
            }
            ProcessLocalColorTable(descriptor, size) => {
                let table = ColorTable::read(&mut self.source, size)?;

                Ok(ProcessImageData(descriptor, Some(table)))
            }
            ProcessImageData(descriptor, local_color_table) => {
                let sequence = self.images.len();
                let rendered = match self.options.image {
                    ImageSelection::All => true,
                    ImageSelection::Index(requested) => requested == sequence,
                };
                let graphic_control = self.graphic_control.take();

                log!(self.report_level(), "reading image sequence {sequence}");
                self.process_image_data(&descriptor, local_color_table.as_ref(), graphic_control, rendered, sink)
                    .with_context(|| format!("failed to decode image {sequence}"))?;

                self.images.push(ImageRecord {
                    descriptor,
                    graphic_control,
                    rendered,
                });

                let keep_reading = self.options.drain_stream
                    || match self.options.image {
                        ImageSelection::All => true,
                        ImageSelection::Index(requested) => self.images.len() <= requested,
                    };

                Ok(if keep_reading { DetermineNextBlock } else { Done })
            }
            Done => Ok(Done),
        }
    }

    fn process_extension(&mut self, label: ExtensionType) -> Result<ParserState> {
        debug!("processing extension type: {:?}", label);
        match label {
            ExtensionType::Comment => {
                let mut buf = [0u8; MAX_SUB_BLOCK_LEN];
                let mut text = Vec::new();

                while let SubBlock::Data(length) = read_sub_block(&mut self.source, &mut buf)? {
                    let block = &buf[..length];
                    if self.options.show_comments {
                        info!("gif comment: {}", String::from_utf8_lossy(block));
                    }
                    text.extend_from_slice(block);
                }

                self.comments.push(text.into_boxed_slice());
            }
            ExtensionType::GraphicControl => {
                let mut buf = [0u8; MAX_SUB_BLOCK_LEN];
                let offset = self.source.position();

                let length = match read_sub_block(&mut self.source, &mut buf)? {
                    SubBlock::Data(length) => length,
                    SubBlock::Eod => 0,
                    SubBlock::Eof => {
                        return Err(ParserError::Truncated {
                            what: "graphic control extension",
                            offset,
                        }
                        .into())
                    }
                };

                let graphic_control = GraphicControl::parse(&buf[..length])?;
                if length > 0 {
                    skip_through_eod(&mut self.source)?;
                }

                debug!("processed graphic control extension: {:#?}", graphic_control);
                self.graphic_control = Some(graphic_control);
            }
            ExtensionType::Application | ExtensionType::PlainText => skip_through_eod(&mut self.source)?,
            ExtensionType::Unknown(label) => {
                warn!("ignoring unrecognized extension (type 0x{label:02x})");
                skip_through_eod(&mut self.source)?;
            }
        }

        log!(self.report_level(), " got a '{:?}' extension", label);
        Ok(ParserState::DetermineNextBlock)
    }

    fn process_image_data<K: RasterSink + ?Sized>(
        &mut self,
        descriptor: &ImageDescriptor,
        local_color_table: Option<&ColorTable>,
        graphic_control: Option<GraphicControl>,
        rendered: bool,
        sink: &mut K,
    ) -> Result<()> {
        let color_table = local_color_table
            .or(self.global_color_table.as_ref())
            .ok_or(ParserError::MissingColorTable)?;
        let transparent_index = graphic_control.and_then(|control| control.transparent_color_index);

        let level = self.report_level();
        match transparent_index {
            Some(index) => match color_table.get(index as usize) {
                Some(rgb) => log!(
                    level,
                    "transparent background color: rgb:{:02x}/{:02x}/{:02x} index {}",
                    rgb.red,
                    rgb.green,
                    rgb.blue,
                    index
                ),
                None => log!(level, "transparent background color index {index} is outside the color table"),
            },
            None => log!(level, "no transparency"),
        }

        if !rendered {
            return read_image_data::<_, K>(&mut self.source, descriptor, color_table, transparent_index, false, None);
        }

        let model = color_table.color_model();
        log!(level, "rendering a {:?} raster", model);

        sink.begin(descriptor.width, descriptor.height, model)?;
        read_image_data(
            &mut self.source,
            descriptor,
            color_table,
            transparent_index,
            self.options.track_alpha,
            Some(&mut *sink),
        )?;
        sink.commit()
    }

    fn read_bytes(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        read_field(&mut self.source, buf, what)
    }

    fn read_byte(&mut self, what: &'static str) -> Result<u8> {
        let mut buffer: [u8; 1] = [0; 1];
        self.read_bytes(&mut buffer, what)?;
        Ok(buffer[0])
    }
}

/// Pixel aspect ratio (width over height) encoded by the screen descriptor.
fn aspect_ratio(value: u8) -> f32 {
    if value == 0 {
        1.0
    } else {
        (value as f32 + 15.0) / 64.0
    }
}

/// Decompresses one image's data into the assembler, leaving the stream
/// positioned after the image's EOD marker.
fn read_image_data<S: ByteSource, K: RasterSink + ?Sized>(
    source: &mut S,
    descriptor: &ImageDescriptor,
    color_table: &ColorTable,
    transparent_index: Option<u8>,
    track_alpha: bool,
    sink: Option<&mut K>,
) -> Result<()> {
    let mut min_code_size = [0u8; 1];
    read_field(source, &mut min_code_size, "minimum code size")?;

    let mut decompressor = Decompressor::new(min_code_size[0])?;
    let cursor = Cursor::new(descriptor.width, descriptor.height, descriptor.interlace_flag);
    let mut assembler = RasterAssembler::new(cursor, color_table, transparent_index, track_alpha, sink);

    while !assembler.cursor().is_done() {
        match decompressor.next_byte(source)? {
            Lzw::Data(value) => assembler.place(value)?,
            Lzw::EndOfImage => {
                return Err(ParserError::NotEnoughRasterData {
                    width: descriptor.width,
                    height: descriptor.height,
                    row: assembler.cursor().row() as u16,
                }
                .into())
            }
            Lzw::EndOfStream => return Err(ParserError::PrematureEndOfStream.into()),
        }
    }

    match decompressor.next_byte(source) {
        Ok(Lzw::Data(_)) => {
            warn!("extraneous data at end of image, skipped to end of image");
            decompressor.skip_to_end(source)?;
        }
        Ok(Lzw::EndOfImage) | Ok(Lzw::EndOfStream) => {}
        Err(err) => {
            warn!("ignoring error after the last pixel of the image, skipped to end of image: {err:#}");
            decompressor.skip_to_end(source)?;
        }
    }

    debug!(
        "image data done, code width {} with next table slot {}",
        decompressor.code_width(),
        decompressor.next_slot()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{aspect_ratio, Decoder, ExtensionType, Version};
    use crate::parser::{DecodeOptions, ImageSelection, ParserError};
    use crate::sink::Frames;

    #[test]
    fn version_strings() {
        assert_eq!(Version::try_from(&b"87a"[..]), Ok(Version::V87a));
        assert_eq!(Version::try_from(&b"89a"[..]), Ok(Version::V89a));
        assert_eq!(
            Version::try_from(&b"90a"[..]),
            Err(ParserError::UnsupportedVersion("90a".into()))
        );
    }

    #[test]
    fn extension_labels() {
        assert_eq!(ExtensionType::from(0xf9), ExtensionType::GraphicControl);
        assert_eq!(ExtensionType::from(0xfe), ExtensionType::Comment);
        assert_eq!(ExtensionType::from(0xff), ExtensionType::Application);
        assert_eq!(ExtensionType::from(0x01), ExtensionType::PlainText);
        assert_eq!(ExtensionType::from(0x42), ExtensionType::Unknown(0x42));
    }

    #[test]
    fn aspect_ratios() {
        assert_eq!(aspect_ratio(0), 1.0);
        assert_eq!(aspect_ratio(49), 1.0);
        assert_eq!(aspect_ratio(17), 0.5);
    }

    #[test]
    fn bad_signature() {
        let stream = b"PNG89a\x01\x00\x01\x00\x00\x00\x00;";
        let mut decoder = Decoder::from_reader(&stream[..], DecodeOptions::default());
        let err = decoder.decode(&mut Frames::new()).unwrap_err();
        assert_eq!(err.downcast_ref::<ParserError>(), Some(&ParserError::InvalidSignature));
    }

    #[test]
    fn truncated_screen_descriptor() {
        let stream = b"GIF89a\x01\x00";
        let mut decoder = Decoder::from_reader(&stream[..], DecodeOptions::default());
        let err = decoder.decode(&mut Frames::new()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ParserError>(),
            Some(&ParserError::Truncated {
                what: "logical screen descriptor",
                offset: 6
            })
        );
    }

    #[test]
    fn header_only_stream_has_no_images() {
        let stream = b"GIF87a\x02\x00\x03\x00\x00\x00\x00;";
        let options = DecodeOptions::default().image(ImageSelection::All);
        let mut decoder = Decoder::from_reader(&stream[..], options);
        let mut frames = Frames::new();
        decoder.decode(&mut frames).unwrap();

        assert_eq!(decoder.version(), Some(Version::V87a));
        let screen = decoder.logical_screen_descriptor().unwrap();
        assert_eq!(screen.screen_width, 2);
        assert_eq!(screen.screen_height, 3);
        assert_eq!(screen.global_color_table_size, None);
        assert!(decoder.global_color_table().is_none());
        assert!(frames.rasters().is_empty());
    }

    #[test]
    fn missing_image_is_reported_at_trailer() {
        let stream = b"GIF89a\x02\x00\x03\x00\x00\x00\x00;";
        let mut decoder = Decoder::from_reader(&stream[..], DecodeOptions::default());
        let err = decoder.decode(&mut Frames::new()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ParserError>(),
            Some(&ParserError::ImageNotFound { requested: 0, found: 0 })
        );
    }

    #[test]
    fn color_resolution_uses_the_high_bits() {
        // 0b0101_0000: no global table, color resolution field 5
        let stream = b"GIF89a\x01\x00\x01\x00\x50\x00\x00;";
        let options = DecodeOptions::default().image(ImageSelection::All);
        let mut decoder = Decoder::from_reader(&stream[..], options);
        decoder.decode(&mut Frames::new()).unwrap();

        assert_eq!(decoder.logical_screen_descriptor().unwrap().color_resolution, 6);
    }
}
