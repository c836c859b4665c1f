//! Image persistence for markup output.
//!
//! Images are either inlined as data URIs or written once into an asset
//! directory. File names depend only on the page and element index, so
//! pages processed in parallel never write the same file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::ImageSource;
use crate::parser::images::ImageData;

/// Deterministic file name of an element image.
pub fn image_file_name(page: u32, index: usize, extension: &str) -> String {
    format!("p{}_img{}.{}", page, index, extension)
}

/// Deterministic file name of a page background.
pub fn background_file_name(page: u32) -> String {
    format!("p{}_background.png", page)
}

/// Where extracted images go.
#[derive(Debug, Clone, Default)]
pub enum AssetStore {
    /// Inline data URIs
    #[default]
    Inline,
    /// Files in a directory; `src` attributes carry `dir/name`
    Directory(PathBuf),
}

impl AssetStore {
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => AssetStore::Directory(dir.to_path_buf()),
            None => AssetStore::Inline,
        }
    }

    /// Create the asset directory if needed.
    pub fn prepare(&self) -> Result<()> {
        if let AssetStore::Directory(dir) = self {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Store the image of element `index` on `page`.
    pub fn store_image(&self, page: u32, index: usize, data: ImageData) -> Result<ImageSource> {
        let name = image_file_name(page, index, data.extension());
        self.store(name, data)
    }

    /// Store the background raster of `page`.
    pub fn store_background(&self, page: u32, png: Vec<u8>) -> Result<ImageSource> {
        let data = ImageData {
            bytes: png,
            mime: "image/png".to_string(),
        };
        self.store(background_file_name(page), data)
    }

    fn store(&self, name: String, data: ImageData) -> Result<ImageSource> {
        match self {
            AssetStore::Inline => Ok(ImageSource::DataUri {
                mime: data.mime,
                bytes: data.bytes,
            }),
            AssetStore::Directory(dir) => {
                let path = dir.join(&name);
                fs::write(&path, &data.bytes)?;
                log::debug!("wrote {} ({} bytes)", path.display(), data.bytes.len());
                Ok(ImageSource::File { path })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png() -> ImageData {
        ImageData {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime: "image/png".into(),
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(image_file_name(3, 7, "jpg"), "p3_img7.jpg");
        assert_eq!(background_file_name(2), "p2_background.png");
    }

    #[test]
    fn test_inline_store() {
        let source = AssetStore::Inline.store_image(1, 0, png()).unwrap();
        assert!(source.to_src().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_directory_store() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::Directory(dir.path().join("assets"));
        store.prepare().unwrap();
        let source = store.store_image(2, 5, png()).unwrap();
        let ImageSource::File { path } = &source else {
            panic!("expected file source");
        };
        assert!(path.ends_with("p2_img5.png"));
        assert_eq!(fs::read(path).unwrap(), png().bytes);
    }
}
