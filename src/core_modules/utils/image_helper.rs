pub mod image_helper {
    use crate::error::{EncodeError, StorageError};
    use image::ImageEncoder as _;
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Turns a packed `width * height` RGB8 raster into encoded image bytes.
    pub trait ImageEncoder: Send + Sync {
        fn encode(&self, width: u32, height: u32, rgb: &[u8]) -> Result<Vec<u8>, EncodeError>;

        /// File extension of the produced format, without the dot.
        fn extension(&self) -> &'static str;
    }

    /// PNG output through the `image` crate.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PngImageEncoder;

    impl ImageEncoder for PngImageEncoder {
        fn encode(&self, width: u32, height: u32, rgb: &[u8]) -> Result<Vec<u8>, EncodeError> {
            let expected = width as usize * height as usize * 3;
            if rgb.len() != expected {
                return Err(EncodeError::RasterSize {
                    width,
                    height,
                    expected,
                    actual: rgb.len(),
                });
            }

            let mut bytes = Vec::new();
            let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
            encoder.write_image(rgb, width, height, image::ExtendedColorType::Rgb8)?;
            Ok(bytes)
        }

        fn extension(&self) -> &'static str {
            "png"
        }
    }

    /// Writes encoded image bytes to `path`, creating parent directories.
    ///
    /// The bytes go to `<path>.tmp` first and are renamed into place, so `path`
    /// either holds a complete image or does not exist.
    pub fn save(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staging = staging_path(path);
        let written = fs::write(&staging, bytes)
            .map_err(|source| StorageError::Write {
                path: staging.clone(),
                source,
            })
            .and_then(|()| {
                fs::rename(&staging, path).map_err(|source| StorageError::Write {
                    path: path.to_path_buf(),
                    source,
                })
            });
        if written.is_err() {
            let _ = fs::remove_file(&staging);
        }
        written
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::error::{EncodeError, StorageError};

    fn decode(bytes: &[u8]) -> image::RgbImage {
        image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .expect("decodable png")
            .to_rgb8()
    }

    #[test]
    fn encode_white_file() {
        let height = 50u32;
        let width = 80u32;
        let buffer = vec![255u8; (width * height * 3) as usize];

        let bytes = PngImageEncoder.encode(width, height, &buffer).expect("Error Encoding File.");
        let image = decode(&bytes);
        assert_eq!(image.dimensions(), (width, height));
        assert_eq!(image.get_pixel(79, 49).0, [255, 255, 255]);
    }

    #[test]
    fn encode_gradient_keeps_row_order() {
        let height = 4u32;
        let width = 3u32;
        let mut buffer = vec![0u8; (width * height * 3) as usize];
        for (row, pixels) in buffer.chunks_mut((width * 3) as usize).enumerate() {
            for channel in pixels {
                *channel = (row * 60) as u8;
            }
        }

        let image = decode(&PngImageEncoder.encode(width, height, &buffer).expect("encode"));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(2, 3).0, [180, 180, 180]);
    }

    #[test]
    fn raster_size_mismatch_is_rejected() {
        let result = PngImageEncoder.encode(4, 4, &[0u8; 10]);
        assert!(matches!(result, Err(EncodeError::RasterSize { expected: 48, actual: 10, .. })));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.png");
        save(&path, b"bytes").expect("save");
        assert_eq!(std::fs::read(&path).expect("read"), b"bytes");
        assert!(!dir.path().join("nested").join("out.png.tmp").exists());
    }

    #[test]
    fn failed_write_leaves_no_image_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.png");
        let blocked = dir.path().join("out.png.tmp");
        std::fs::create_dir(&blocked).expect("mkdir");
        std::fs::write(blocked.join("inside"), b"x").expect("write");

        assert!(matches!(save(&path, b"bytes"), Err(StorageError::Write { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn failed_rename_cleans_up_the_staging_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.png");
        std::fs::create_dir(&path).expect("mkdir");
        std::fs::write(path.join("inside"), b"x").expect("write");

        assert!(matches!(save(&path, b"bytes"), Err(StorageError::Write { .. })));
        assert!(!dir.path().join("out.png.tmp").exists());
        assert!(path.is_dir());
    }
}
