//! GIF flavoured LZW decompression.
//!
//! With an initial code width of `W` the code space is laid out as:
//!
//! * `0 .. 2^W`: direct codes, each one is the data element of the same value
//! * `2^W`: the clear code, resets the string table and the code width
//! * `2^W + 1`: the end code, ends the image data
//! * `2^W + 2 ..`: string codes, defined as the stream progresses
//!
//! Codes start out `W + 1` bits wide and grow by one bit every time the
//! string table fills up the current width, up to 12 bits.

use crate::source::ByteSource;

use super::bit_reader::{skip_through_eod, CodeReader};
use super::ParserError;

use anyhow::Result;
use log::debug;

pub(crate) const MAX_CODE_WIDTH: u8 = 12;
pub(crate) const TABLE_CAPACITY: usize = 1 << MAX_CODE_WIDTH;
pub(crate) const MAX_MIN_CODE_SIZE: u8 = 8;

const STACK_CAPACITY: usize = TABLE_CAPACITY * 2;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    prefix: u16,
    suffix: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lzw {
    Data(u8),
    /// The end code was consumed, the stream sits after the image's EOD.
    EndOfImage,
    /// The image data ran out before the end code.
    EndOfStream,
}

pub(crate) struct Decompressor {
    reader: CodeReader,
    table: Box<[Entry; TABLE_CAPACITY]>,
    // pending output, the first element of a string is on top
    stack: Vec<u8>,

    min_code_size: u8,
    clear_code: u16,
    end_code: u16,

    code_width: u8,
    max_code: u16,
    next_slot: u16,
    // at the start of the stream or right after a clear code
    fresh: bool,
    // always a direct code, the first element of the last string
    first_code: u16,
    prev_code: u16,
}

impl Decompressor {
    pub(crate) fn new(min_code_size: u8) -> Result<Self> {
        if min_code_size > MAX_MIN_CODE_SIZE {
            return Err(ParserError::InvalidMinCodeSize(min_code_size).into());
        }

        let clear_code: u16 = 1 << min_code_size;
        let end_code = clear_code + 1;
        debug!("initial code size is {min_code_size} bits; clear code = 0x{clear_code:x}, end code = 0x{end_code:x}");

        // direct code entries never change for the life of the stream
        let mut table = Box::new([Entry::default(); TABLE_CAPACITY]);
        for code in 0..clear_code {
            table[code as usize] = Entry {
                prefix: 0,
                suffix: code as u8,
            };
        }

        let mut decompressor = Self {
            reader: CodeReader::new(),
            table,
            stack: Vec::with_capacity(STACK_CAPACITY),
            min_code_size,
            clear_code,
            end_code,
            code_width: 0,
            max_code: 0,
            next_slot: 0,
            fresh: true,
            first_code: 0,
            prev_code: 0,
        };
        decompressor.reset();

        Ok(decompressor)
    }

    pub(crate) fn code_width(&self) -> u8 {
        self.code_width
    }

    pub(crate) fn next_slot(&self) -> u16 {
        self.next_slot
    }

    fn reset(&mut self) {
        self.code_width = self.min_code_size + 1;
        self.max_code = 1 << self.code_width;
        self.next_slot = self.end_code + 1;
        self.fresh = true;
    }

    /// Returns the next data element of the image.
    pub(crate) fn next_byte<S: ByteSource>(&mut self, source: &mut S) -> Result<Lzw> {
        if let Some(value) = self.stack.pop() {
            return Ok(Lzw::Data(value));
        }

        loop {
            let code = match self.reader.next_code(source, self.code_width)? {
                Some(code) => code,
                None => return Ok(Lzw::EndOfStream),
            };

            if code == self.clear_code {
                debug!("clear code, resetting string table");
                self.reset();
                continue;
            }

            if code == self.end_code {
                self.skip_to_end(source)?;
                return Ok(Lzw::EndOfImage);
            }

            if self.fresh {
                // no strings are defined yet, so this must be a direct code
                self.fresh = false;
                if code > self.end_code {
                    return Err(ParserError::FirstCodeNotDirect {
                        code,
                        clear_code: self.clear_code,
                    }
                    .into());
                }
                self.first_code = code;
                self.prev_code = code;
                return Ok(Lzw::Data(code as u8));
            }

            self.expand_code_onto_stack(code)?;
            return Ok(Lzw::Data(self.first_code as u8));
        }
    }

    /// Positions the stream after the image's EOD marker.
    pub(crate) fn skip_to_end<S: ByteSource>(&mut self, source: &mut S) -> Result<()> {
        if !self.reader.at_eod() {
            skip_through_eod(source)?;
        }
        Ok(())
    }

    fn push(&mut self, value: u8) -> Result<()> {
        if self.stack.len() >= STACK_CAPACITY {
            return Err(ParserError::StackOverflow.into());
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pushes the string `incode` stands for, minus its first element, so
    /// that it pops in order. The first element is left in `first_code`.
    /// Then extends the string table.
    fn expand_code_onto_stack(&mut self, incode: u16) -> Result<()> {
        let mut code = if incode < self.next_slot {
            incode
        } else {
            // refers to the string being defined right now: the previous
            // string followed by its own first element
            self.push(self.first_code as u8)?;
            self.prev_code
        };

        let mut string_count = 0;
        while code >= self.clear_code {
            if string_count > TABLE_CAPACITY {
                return Err(ParserError::LzwStringLoop { code: incode }.into());
            }
            string_count += 1;

            let entry = self.table[code as usize];
            self.push(entry.suffix)?;
            code = entry.prefix;
        }
        self.first_code = code;

        if (self.next_slot as usize) < TABLE_CAPACITY {
            self.table[self.next_slot as usize] = Entry {
                prefix: self.prev_code,
                suffix: self.first_code as u8,
            };
            self.next_slot += 1;

            // codes of the current width are used up, later codes are one
            // bit wider unless already at the maximum
            if self.next_slot >= self.max_code && self.code_width < MAX_CODE_WIDTH {
                self.code_width += 1;
                self.max_code = 1 << self.code_width;
            }
        }

        self.prev_code = incode;
        Ok(())
    }
}
