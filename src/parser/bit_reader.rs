use crate::source::ByteSource;

use super::ParserError;

use anyhow::Result;
use log::{debug, warn};

use std::io::ErrorKind;

pub(crate) const MAX_SUB_BLOCK_LEN: usize = 255;

/// Outcome of pulling one length-prefixed sub-block off the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubBlock {
    /// That many bytes were written to the start of the buffer.
    Data(usize),
    /// Zero-length block, the end-of-data marker.
    Eod,
    /// The stream ended where a length byte was expected.
    Eof,
}

/// Reads one sub-block into `buf`, which must hold at least 255 bytes.
///
/// Running out of input on the length byte is reported as [`SubBlock::Eof`];
/// running out inside the data portion is an error.
pub(crate) fn read_sub_block<S: ByteSource>(source: &mut S, buf: &mut [u8]) -> Result<SubBlock> {
    debug_assert!(buf.len() >= MAX_SUB_BLOCK_LEN);

    let offset = source.position();
    let mut length = [0u8; 1];
    if let Err(err) = source.read_exact(&mut length) {
        if err.kind() == ErrorKind::UnexpectedEof {
            debug!("EOF reading sub-block size at offset {offset}");
            return Ok(SubBlock::Eof);
        }
        return Err(err.into());
    }

    let length = length[0];
    debug!("{length} byte block at offset {offset}");
    if length == 0 {
        return Ok(SubBlock::Eod);
    }

    source
        .read_exact(&mut buf[..length as usize])
        .map_err(|err| -> anyhow::Error {
            match err.kind() {
                ErrorKind::UnexpectedEof => ParserError::TruncatedSubBlock { length, offset }.into(),
                _ => err.into(),
            }
        })?;

    Ok(SubBlock::Data(length as usize))
}

/// Discards sub-blocks up to and including the next end-of-data marker.
///
/// A stream that ends first is malformed, but is treated as if the marker
/// sat at the end of the stream.
pub(crate) fn skip_through_eod<S: ByteSource>(source: &mut S) -> Result<()> {
    let mut buf = [0u8; MAX_SUB_BLOCK_LEN];
    loop {
        match read_sub_block(source, &mut buf)? {
            SubBlock::Data(_) => continue,
            SubBlock::Eod => return Ok(()),
            SubBlock::Eof => {
                warn!(
                    "EOF encountered before EOD marker. The GIF stream is malformed, \
                     proceeding as if an EOD marker were at the end of the stream"
                );
                return Ok(());
            }
        }
    }
}

/// Pulls variable width LZW codes out of the sub-blocks of one image.
///
/// Codes are packed least significant bit first and may straddle sub-block
/// boundaries, so the unread tail of the previous block is carried over.
pub(crate) struct CodeReader {
    buf: [u8; 4 + MAX_SUB_BLOCK_LEN],
    len: usize,
    // index by bit instead of by byte
    position: usize,
    // the last fetch found EOD or EOF, nothing more will come
    exhausted: bool,
    // the most recently fetched sub-block was the EOD marker
    at_eod: bool,
}

impl CodeReader {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; 4 + MAX_SUB_BLOCK_LEN],
            len: 0,
            position: 0,
            exhausted: false,
            at_eod: false,
        }
    }

    pub(crate) fn at_eod(&self) -> bool {
        self.at_eod
    }

    /// Returns the next `width` bit code, or `None` once the image data is
    /// used up.
    pub(crate) fn next_code<S: ByteSource>(&mut self, source: &mut S, width: u8) -> Result<Option<u16>> {
        let width = width as usize;

        while self.position + width > self.len * 8 && !self.exhausted {
            self.fetch_block(source)?;
        }

        if self.position + width > self.len * 8 {
            let bits_unused = self.len * 8 - self.position;
            if bits_unused > 0 {
                warn!(
                    "stream ends with a partial code ({bits_unused} bits left, expected a {width} bit code), ignoring"
                );
                self.position = self.len * 8;
            }
            return Ok(None);
        }

        // end position not inclusive
        let mut code: u16 = 0;
        for (shift, i) in (self.position..self.position + width).enumerate() {
            let byte = self.buf[i / 8];
            let bit = (byte >> (i % 8)) as u16 & 1;
            code |= bit << shift;
        }
        self.position += width;

        Ok(Some(code))
    }

    fn fetch_block<S: ByteSource>(&mut self, source: &mut S) -> Result<()> {
        // move the unread bytes down to the front of the buffer
        let keep_from = self.position / 8;
        self.buf.copy_within(keep_from..self.len, 0);
        self.len -= keep_from;
        self.position -= keep_from * 8;

        let count = match read_sub_block(source, &mut self.buf[self.len..])? {
            SubBlock::Data(count) => {
                self.at_eod = false;
                count
            }
            SubBlock::Eod => {
                self.at_eod = true;
                0
            }
            SubBlock::Eof => {
                warn!(
                    "EOF encountered in image before EOD marker. The GIF stream is malformed, \
                     proceeding as if an EOD marker were at the end of the stream"
                );
                0
            }
        };

        self.exhausted = count == 0;
        self.len += count;
        Ok(())
    }
}
