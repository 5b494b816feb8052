use crate::parser::Rgb;

use anyhow::{anyhow, Result};

/// Smallest raster format able to hold an image's colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// Only black and white.
    Bitmap,
    /// Shades of gray.
    Grayscale,
    Color,
}

/// Receiver of decoded images.
///
/// For each image the decoder renders it calls `begin`, then `place` once
/// per pixel (and `place_alpha` when transparency tracking is on) in stream
/// order, and `commit` once the whole image decoded cleanly. An image whose
/// decoding fails is never committed.
pub trait RasterSink {
    fn begin(&mut self, width: u16, height: u16, model: ColorModel) -> Result<()>;

    fn place(&mut self, col: u32, row: u32, rgb: Rgb);

    fn place_alpha(&mut self, col: u32, row: u32, opaque: bool);

    fn commit(&mut self) -> Result<()>;
}

/// A decoded image held in memory, row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u16,
    pub height: u16,
    pub model: ColorModel,
    pixels: Vec<Rgb>,
    alpha: Option<Vec<bool>>,
}

impl Raster {
    pub fn new(width: u16, height: u16, model: ColorModel) -> Self {
        Self {
            width,
            height,
            model,
            pixels: vec![Rgb::default(); width as usize * height as usize],
            alpha: None,
        }
    }

    fn index(&self, col: u32, row: u32) -> Option<usize> {
        if col < self.width.into() && row < self.height.into() {
            Some(row as usize * self.width as usize + col as usize)
        } else {
            None
        }
    }

    pub fn pixel(&self, col: u32, row: u32) -> Option<Rgb> {
        self.index(col, row).map(|i| self.pixels[i])
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// `None` if transparency was not tracked for this raster.
    pub fn is_opaque(&self, col: u32, row: u32) -> Option<bool> {
        let i = self.index(col, row)?;
        self.alpha.as_ref().map(|alpha| alpha[i])
    }

    pub fn alpha(&self) -> Option<&[bool]> {
        self.alpha.as_deref()
    }

    fn set_pixel(&mut self, col: u32, row: u32, rgb: Rgb) {
        if let Some(i) = self.index(col, row) {
            self.pixels[i] = rgb;
        }
    }

    fn set_alpha(&mut self, col: u32, row: u32, opaque: bool) {
        if let Some(i) = self.index(col, row) {
            let len = self.pixels.len();
            self.alpha.get_or_insert_with(|| vec![true; len])[i] = opaque;
        }
    }
}

/// Collects every committed image in order.
#[derive(Debug, Default)]
pub struct Frames {
    rasters: Vec<Raster>,
    pending: Option<Raster>,
}

impl Frames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rasters(&self) -> &[Raster] {
        &self.rasters
    }

    pub fn into_rasters(self) -> Vec<Raster> {
        self.rasters
    }
}

impl RasterSink for Frames {
    fn begin(&mut self, width: u16, height: u16, model: ColorModel) -> Result<()> {
        // an image that failed part way is dropped here
        self.pending = Some(Raster::new(width, height, model));
        Ok(())
    }

    fn place(&mut self, col: u32, row: u32, rgb: Rgb) {
        if let Some(raster) = self.pending.as_mut() {
            raster.set_pixel(col, row, rgb);
        }
    }

    fn place_alpha(&mut self, col: u32, row: u32, opaque: bool) {
        if let Some(raster) = self.pending.as_mut() {
            raster.set_alpha(col, row, opaque);
        }
    }

    fn commit(&mut self) -> Result<()> {
        let raster = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("commit called without a raster in progress"))?;
        self.rasters.push(raster);
        Ok(())
    }
}
