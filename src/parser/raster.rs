use crate::sink::RasterSink;

use super::{ColorTable, ParserError};

use anyhow::Result;

/// The four passes of an interlaced image, in the order they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    /// Rows 0, 8, 16, ...
    Mult8Plus0,
    /// Rows 4, 12, 20, ...
    Mult8Plus4,
    /// Rows 2, 6, 10, ...
    Mult4Plus2,
    /// Rows 1, 3, 5, ...
    Mult2Plus1,
}

impl Pass {
    fn step(self) -> u32 {
        match self {
            Pass::Mult8Plus0 | Pass::Mult8Plus4 => 8,
            Pass::Mult4Plus2 => 4,
            Pass::Mult2Plus1 => 2,
        }
    }

    /// The following pass and the row it starts on.
    fn next(self) -> Option<(Pass, u32)> {
        match self {
            Pass::Mult8Plus0 => Some((Pass::Mult8Plus4, 4)),
            Pass::Mult8Plus4 => Some((Pass::Mult4Plus2, 2)),
            Pass::Mult4Plus2 => Some((Pass::Mult2Plus1, 1)),
            Pass::Mult2Plus1 => None,
        }
    }
}

/// Position of the next pixel in image coordinates.
#[derive(Debug)]
pub(crate) struct Cursor {
    width: u32,
    height: u32,
    col: u32,
    row: u32,
    // None for images stored top to bottom
    pass: Option<Pass>,
}

impl Cursor {
    pub(crate) fn new(width: u16, height: u16, interlaced: bool) -> Self {
        Self {
            width: width.into(),
            height: height.into(),
            col: 0,
            row: 0,
            pass: interlaced.then_some(Pass::Mult8Plus0),
        }
    }

    pub(crate) fn col(&self) -> u32 {
        self.col
    }

    pub(crate) fn row(&self) -> u32 {
        self.row
    }

    /// Every row has been visited. Zero-width images have no pixels at all.
    pub(crate) fn is_done(&self) -> bool {
        self.width == 0 || self.row >= self.height
    }

    pub(crate) fn advance(&mut self) {
        self.col += 1;
        if self.col < self.width {
            return;
        }

        self.col = 0;
        match self.pass {
            Some(pass) => self.bump_row_interlaced(pass),
            None => self.row += 1,
        }
    }

    fn bump_row_interlaced(&mut self, mut pass: Pass) {
        self.row += pass.step();

        // with fewer than 5 rows whole passes can be empty, so keep moving on
        // until a pass has the row or the last pass runs out
        while self.row >= self.height {
            match pass.next() {
                Some((next, start)) => {
                    pass = next;
                    self.row = start;
                }
                None => break,
            }
        }
        self.pass = Some(pass);
    }
}

/// Places decoded data elements into image coordinates through a color table.
pub(crate) struct RasterAssembler<'a, K: RasterSink + ?Sized> {
    cursor: Cursor,
    color_table: &'a ColorTable,
    transparent_index: Option<u8>,
    track_alpha: bool,
    // absent when the image is decoded only to get past it
    sink: Option<&'a mut K>,
}

impl<'a, K: RasterSink + ?Sized> RasterAssembler<'a, K> {
    pub(crate) fn new(
        cursor: Cursor,
        color_table: &'a ColorTable,
        transparent_index: Option<u8>,
        track_alpha: bool,
        sink: Option<&'a mut K>,
    ) -> Self {
        Self {
            cursor,
            color_table,
            transparent_index,
            track_alpha,
            sink,
        }
    }

    pub(crate) fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub(crate) fn place(&mut self, value: u8) -> Result<()> {
        let rgb = self
            .color_table
            .get(value as usize)
            .ok_or(ParserError::InvalidColorIndex {
                index: value,
                table_size: self.color_table.len(),
            })?;

        if let Some(sink) = self.sink.as_deref_mut() {
            let (col, row) = (self.cursor.col(), self.cursor.row());
            sink.place(col, row, rgb);
            if self.track_alpha {
                sink.place_alpha(col, row, Some(value) != self.transparent_index);
            }
        }

        self.cursor.advance();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Cursor, RasterAssembler};
    use crate::parser::{ColorTable, ParserError, Rgb};
    use crate::sink::{ColorModel, Frames};
    use crate::sink::RasterSink;

    fn visited_rows(height: u16) -> Vec<u32> {
        let mut cursor = Cursor::new(1, height, true);
        let mut rows = Vec::new();
        while !cursor.is_done() {
            rows.push(cursor.row());
            cursor.advance();
        }
        rows
    }

    #[test]
    fn sequential_rows() {
        let mut cursor = Cursor::new(2, 2, false);
        let mut visited = Vec::new();
        while !cursor.is_done() {
            visited.push((cursor.col(), cursor.row()));
            cursor.advance();
        }
        assert_eq!(visited, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn interlace_pass_order() {
        assert_eq!(
            visited_rows(10),
            vec![0, 8, 4, 2, 6, 1, 3, 5, 7, 9]
        );
    }

    #[test]
    fn interlace_small_images_skip_empty_passes() {
        assert_eq!(visited_rows(1), vec![0]);
        assert_eq!(visited_rows(2), vec![0, 1]);
        assert_eq!(visited_rows(3), vec![0, 2, 1]);
        assert_eq!(visited_rows(4), vec![0, 2, 1, 3]);
        assert_eq!(visited_rows(5), vec![0, 4, 2, 1, 3]);
    }

    #[test]
    fn interlace_visits_every_row_once() {
        for height in 1..=64u16 {
            let rows = visited_rows(height);
            let mut sorted = rows.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..height as u32).collect::<Vec<_>>(), "height {height}");

            // pass membership never goes backwards
            let pass_of = |row: u32| match row {
                r if r % 8 == 0 => 0,
                r if r % 8 == 4 => 1,
                r if r % 4 == 2 => 2,
                _ => 3,
            };
            let passes: Vec<_> = rows.iter().map(|&row| pass_of(row)).collect();
            assert!(passes.windows(2).all(|pair| pair[0] <= pair[1]), "height {height}");
        }
    }

    #[test]
    fn places_pixels_and_alpha() {
        let table = ColorTable::from_entries(&[Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
        let mut frames = Frames::new();
        frames.begin(2, 1, ColorModel::Bitmap).unwrap();

        let mut assembler =
            RasterAssembler::new(Cursor::new(2, 1, false), &table, Some(1), true, Some(&mut frames));
        assembler.place(1).unwrap();
        assembler.place(0).unwrap();
        assert!(assembler.cursor().is_done());

        frames.commit().unwrap();
        let raster = &frames.rasters()[0];
        assert_eq!(raster.pixel(0, 0), Some(Rgb::new(255, 255, 255)));
        assert_eq!(raster.pixel(1, 0), Some(Rgb::new(0, 0, 0)));
        assert_eq!(raster.is_opaque(0, 0), Some(false));
        assert_eq!(raster.is_opaque(1, 0), Some(true));
    }

    #[test]
    fn index_beyond_table_is_an_error() {
        let table = ColorTable::from_entries(&[Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
        let mut assembler: RasterAssembler<'_, Frames> =
            RasterAssembler::new(Cursor::new(2, 2, false), &table, None, false, None);

        let err = assembler.place(2).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ParserError>(),
            Some(&ParserError::InvalidColorIndex { index: 2, table_size: 2 })
        );
    }
}
