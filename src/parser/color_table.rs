use crate::sink::ColorModel;
use crate::source::ByteSource;

use super::read_field;

use anyhow::Result;

pub const MAX_COLOR_TABLE_SIZE: usize = 256;

// largest channel value a GIF palette can hold
const GIF_MAXVAL: u8 = 255;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    fn is_gray(&self) -> bool {
        self.red == self.green && self.green == self.blue
    }
}

/// Palette of up to 256 RGB triples, global or local to one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entries: Box<[Rgb]>,
    // at least one gray entry that is neither black nor white
    has_gray: bool,
    // at least one entry that is not gray
    has_color: bool,
}

impl ColorTable {
    pub fn from_entries(entries: &[Rgb]) -> Self {
        debug_assert!(entries.len() <= MAX_COLOR_TABLE_SIZE);

        let has_color = entries.iter().any(|rgb| !rgb.is_gray());
        let has_gray = entries
            .iter()
            .any(|rgb| rgb.is_gray() && rgb.red != 0 && rgb.red != GIF_MAXVAL);

        Self {
            entries: entries.into(),
            has_gray,
            has_color,
        }
    }

    /// Reads `size` consecutive RGB triples.
    pub(crate) fn read<S: ByteSource>(source: &mut S, size: usize) -> Result<Self> {
        let mut buffer = vec![0; size * 3];
        read_field(source, &mut buffer, "color table")?;

        let entries: Vec<Rgb> = buffer
            .chunks_exact(3)
            .map(|rgb| Rgb::new(rgb[0], rgb[1], rgb[2]))
            .collect();

        Ok(Self::from_entries(&entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.entries.get(index).copied()
    }

    pub fn has_gray(&self) -> bool {
        self.has_gray
    }

    pub fn has_color(&self) -> bool {
        self.has_color
    }

    /// The smallest raster format that represents every entry.
    pub fn color_model(&self) -> ColorModel {
        if self.has_color {
            ColorModel::Color
        } else if self.has_gray {
            ColorModel::Grayscale
        } else {
            ColorModel::Bitmap
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorTable, Rgb};
    use crate::parser::ParserError;
    use crate::sink::ColorModel;
    use crate::source::StreamSource;

    #[test]
    fn black_and_white_is_bitmap() {
        let table = ColorTable::from_entries(&[Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
        assert!(!table.has_gray());
        assert!(!table.has_color());
        assert_eq!(table.color_model(), ColorModel::Bitmap);
    }

    #[test]
    fn mid_gray_is_grayscale() {
        let table = ColorTable::from_entries(&[Rgb::new(0, 0, 0), Rgb::new(128, 128, 128)]);
        assert!(table.has_gray());
        assert!(!table.has_color());
        assert_eq!(table.color_model(), ColorModel::Grayscale);
    }

    #[test]
    fn any_hue_is_color() {
        let table = ColorTable::from_entries(&[Rgb::new(128, 128, 128), Rgb::new(255, 0, 0)]);
        assert!(table.has_gray());
        assert!(table.has_color());
        assert_eq!(table.color_model(), ColorModel::Color);
    }

    #[test]
    fn reads_triples_from_source() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut source = StreamSource::new(&data[..]);
        let table = ColorTable::read(&mut source, 2).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(table.get(1), Some(Rgb::new(4, 5, 6)));
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn short_table_is_truncation() {
        let data = [1u8, 2, 3, 4];
        let mut source = StreamSource::new(&data[..]);
        let err = ColorTable::read(&mut source, 2).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ParserError>(),
            Some(&ParserError::Truncated { what: "color table", offset: 0 })
        );
    }
}
