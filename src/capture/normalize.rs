use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageError, ImageFormat};

use crate::models::CapturedImage;

use super::CaptureError;

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

fn image_to_io(err: ImageError) -> io::Error {
    match err {
        ImageError::IoError(err) => err,
        other => io::Error::other(other),
    }
}

/// Decodes a frame, resizes it to exactly `width`x`height` and writes it as
/// PNG. The file appears at `output` only once fully written.
pub fn write_frame(
    address: &str,
    bytes: &[u8],
    width: u32,
    height: u32,
    output: &Path,
) -> Result<CapturedImage, CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::NoFrame {
            address: address.to_string(),
        });
    }

    let frame = image::load_from_memory(bytes).map_err(|source| CaptureError::Decode {
        address: address.to_string(),
        source,
    })?;
    let resized = frame.resize_exact(width, height, FilterType::Triangle);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CaptureError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let partial = partial_path(output);
    let written = (|| -> io::Result<u64> {
        let mut writer = BufWriter::new(File::create(&partial)?);
        resized
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(image_to_io)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&partial, output)?;
        Ok(fs::metadata(output)?.len())
    })();

    match written {
        Ok(bytes) => Ok(CapturedImage {
            path: output.to_path_buf(),
            width,
            height,
            bytes,
        }),
        Err(source) => {
            let _ = fs::remove_file(&partial);
            Err(CaptureError::Write {
                path: output.to_path_buf(),
                source,
            })
        }
    }
}
