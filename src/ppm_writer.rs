//! Plain (ASCII) PNM output for decoded rasters.

use std::fs::File;
use std::io::{prelude::*, BufWriter};

use anyhow::{anyhow, Result};

use crate::sink::{ColorModel, Raster};

const PBM_MAGIC_NUMBER: &[u8] = b"P1";
const PGM_MAGIC_NUMBER: &[u8] = b"P2";
const PPM_MAGIC_NUMBER: &[u8] = b"P3";

const MAXVAL: u8 = 255;

/// File extension matching the format [`write_pnm`] picks for `model`.
pub fn extension(model: ColorModel) -> &'static str {
    match model {
        ColorModel::Bitmap => "pbm",
        ColorModel::Grayscale => "pgm",
        ColorModel::Color => "ppm",
    }
}

pub fn write_pnm(filename: &str, raster: &Raster) -> Result<()> {
    let file = File::create(filename)?;
    let mut writer = BufWriter::new(&file);
    write_pnm_to(&mut writer, raster)?;
    writer.flush()?;
    Ok(())
}

/// Writes the raster as PBM, PGM or PPM depending on its color model.
pub fn write_pnm_to<W: Write>(writer: &mut W, raster: &Raster) -> Result<()> {
    let magic_number = match raster.model {
        ColorModel::Bitmap => PBM_MAGIC_NUMBER,
        ColorModel::Grayscale => PGM_MAGIC_NUMBER,
        ColorModel::Color => PPM_MAGIC_NUMBER,
    };

    writer.write_all(magic_number)?;
    writer.write_all(b"\n")?;
    writer.write_all(format!("{} {}", raster.width, raster.height).as_bytes())?;
    if raster.model != ColorModel::Bitmap {
        writer.write_all(format!(" {MAXVAL}").as_bytes())?;
    }
    writer.write_all(b"\n")?;

    if raster.width == 0 {
        return Ok(());
    }

    for row in raster.pixels().chunks(raster.width as usize) {
        let samples: Vec<String> = row
            .iter()
            .map(|rgb| match raster.model {
                // PBM has 1 for black
                ColorModel::Bitmap => (if rgb.red == 0 { "1" } else { "0" }).to_string(),
                ColorModel::Grayscale => format!("{: >3}", rgb.red),
                ColorModel::Color => format!("{: >3} {: >3} {: >3}", rgb.red, rgb.green, rgb.blue),
            })
            .collect();

        writer.write_all(samples.join(" ").as_bytes())?;
        writer.write_all(b"\n")?;
    }

    Ok(())
}

pub fn write_alpha(filename: &str, raster: &Raster) -> Result<()> {
    let file = File::create(filename)?;
    let mut writer = BufWriter::new(&file);
    write_alpha_to(&mut writer, raster)?;
    writer.flush()?;
    Ok(())
}

/// Writes the transparency mask as PBM, transparent pixels black.
pub fn write_alpha_to<W: Write>(writer: &mut W, raster: &Raster) -> Result<()> {
    let alpha = raster
        .alpha()
        .ok_or_else(|| anyhow!("raster was decoded without transparency tracking"))?;

    writer.write_all(PBM_MAGIC_NUMBER)?;
    writer.write_all(b"\n")?;
    writer.write_all(format!("{} {}", raster.width, raster.height).as_bytes())?;
    writer.write_all(b"\n")?;

    if raster.width == 0 {
        return Ok(());
    }

    for row in alpha.chunks(raster.width as usize) {
        let bits: Vec<&str> = row.iter().map(|&opaque| if opaque { "0" } else { "1" }).collect();
        writer.write_all(bits.join(" ").as_bytes())?;
        writer.write_all(b"\n")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{extension, write_alpha_to, write_pnm_to};
    use crate::parser::Rgb;
    use crate::sink::{ColorModel, Frames, RasterSink};

    fn raster(model: ColorModel, pixels: &[Rgb], alpha: Option<&[bool]>) -> crate::sink::Raster {
        let mut frames = Frames::new();
        frames.begin(2, 1, model).unwrap();
        for (col, rgb) in pixels.iter().enumerate() {
            frames.place(col as u32, 0, *rgb);
            if let Some(alpha) = alpha {
                frames.place_alpha(col as u32, 0, alpha[col]);
            }
        }
        frames.commit().unwrap();
        frames.into_rasters().remove(0)
    }

    #[test]
    fn bitmap_output() {
        let raster = raster(ColorModel::Bitmap, &[Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)], None);
        let mut out = Vec::new();
        write_pnm_to(&mut out, &raster).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "P1\n2 1\n1 0\n");
        assert_eq!(extension(raster.model), "pbm");
    }

    #[test]
    fn grayscale_output() {
        let raster = raster(ColorModel::Grayscale, &[Rgb::new(7, 7, 7), Rgb::new(128, 128, 128)], None);
        let mut out = Vec::new();
        write_pnm_to(&mut out, &raster).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "P2\n2 1 255\n  7 128\n");
    }

    #[test]
    fn color_output() {
        let raster = raster(ColorModel::Color, &[Rgb::new(255, 0, 0), Rgb::new(1, 2, 3)], None);
        let mut out = Vec::new();
        write_pnm_to(&mut out, &raster).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "P3\n2 1 255\n255   0   0   1   2   3\n");
    }

    #[test]
    fn alpha_output() {
        let raster = raster(
            ColorModel::Bitmap,
            &[Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)],
            Some(&[false, true]),
        );
        let mut out = Vec::new();
        write_alpha_to(&mut out, &raster).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "P1\n2 1\n1 0\n");
    }

    #[test]
    fn alpha_output_needs_tracking() {
        let raster = raster(ColorModel::Bitmap, &[Rgb::default(), Rgb::default()], None);
        assert!(write_alpha_to(&mut Vec::new(), &raster).is_err());
    }
}
