use std::fs::{self, File};
use std::io::BufReader;

use anyhow::{Context, Result};
use log::info;

use gifraster::{ppm_writer, DecodeOptions, Decoder, Frames, ImageSelection};

const DEFAULT_INPUT: &str = "./input.gif";
const OUTPUT_DIR: &str = "frames";

fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_INPUT.to_string());
    let file = File::open(&path).with_context(|| format!("failed to open {path}"))?;

    let options = DecodeOptions::new()
        .image(ImageSelection::All)
        .track_alpha(true)
        .show_comments(true);
    let mut decoder = Decoder::from_reader(BufReader::new(file), options);

    let mut frames = Frames::new();
    decoder
        .decode(&mut frames)
        .with_context(|| format!("failed to decode {path}"))?;

    fs::create_dir_all(OUTPUT_DIR)?;
    for (i, raster) in frames.rasters().iter().enumerate() {
        let filename = format!("{OUTPUT_DIR}/frame_{i}.{}", ppm_writer::extension(raster.model));
        ppm_writer::write_pnm(&filename, raster)?;
        info!("wrote {filename}");

        // every image gets a mask, all opaque when it has no transparent index
        let filename = format!("{OUTPUT_DIR}/frame_{i}_alpha.pbm");
        ppm_writer::write_alpha(&filename, raster)?;
        info!("wrote {filename}");
    }

    Ok(())
}
