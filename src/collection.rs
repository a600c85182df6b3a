//! Content-addressed store of composed icons.
//!
//! Each saved icon is written as `<hash>.png`, where the hash is
//! [`Bitmap::hash`] of the pixel buffer. Saving the same pixels twice is a
//! no-op.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bitmap::Bitmap;
use crate::error::CollectionError;

/// Extensions [`Collection::list`] picks up.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Result of [`Collection::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new file was written.
    Saved(PathBuf),
    /// A file with identical pixel content was already present.
    AlreadyPresent(PathBuf),
}

impl SaveOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Saved(path) | Self::AlreadyPresent(path) => path,
        }
    }
}

/// A directory of saved icons keyed by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    root: PathBuf,
}

impl Collection {
    /// Opens a collection rooted at `root`. The directory is created on
    /// first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `bitmap` would be stored, or `None` for an empty bitmap.
    pub fn path_for(&self, bitmap: &Bitmap) -> Option<PathBuf> {
        let hash = bitmap.hash();
        (!hash.is_empty()).then(|| self.root.join(format!("{hash}.png")))
    }

    /// Returns true if an icon with the same pixels is already saved.
    pub fn contains(&self, bitmap: &Bitmap) -> bool {
        self.path_for(bitmap).is_some_and(|path| path.is_file())
    }

    /// Saves `bitmap` as a PNG unless identical content is already stored.
    pub fn save(&self, bitmap: &Bitmap) -> Result<SaveOutcome, CollectionError> {
        let path = self.path_for(bitmap).ok_or(CollectionError::EmptyImage)?;
        if path.is_file() {
            debug!(path = %path.display(), "icon already in collection");
            return Ok(SaveOutcome::AlreadyPresent(path));
        }

        fs::create_dir_all(&self.root).map_err(|e| self.io_error(&self.root, e))?;
        let path = bitmap.write_png(&path)?;
        info!(path = %path.display(), "saved icon to collection");
        Ok(SaveOutcome::Saved(path))
    }

    /// Lists saved images, sorted by path. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<PathBuf>, CollectionError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(&self.root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| self.io_error(&self.root, e))?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Deletes one saved image.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<(), CollectionError> {
        let path = path.as_ref();
        fs::remove_file(path).map_err(|e| self.io_error(path, e))?;
        info!(path = %path.display(), "removed icon from collection");
        Ok(())
    }

    fn io_error(&self, path: &Path, source: io::Error) -> CollectionError {
        CollectionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn is_image(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{scratch_dir, solid};

    #[test]
    fn save_is_content_addressed() {
        let dir = scratch_dir("collection-save");
        let collection = Collection::new(dir.join("collection"));
        let icon = solid(4, 4, [1, 2, 3, 255]);

        let first = collection.save(&icon).unwrap();
        let expected = dir.join("collection").join(format!("{}.png", icon.hash()));
        assert_eq!(first, SaveOutcome::Saved(expected.clone()));
        assert!(expected.is_file());
        assert!(collection.contains(&icon));

        let second = collection.save(&icon.clone()).unwrap();
        assert_eq!(second, SaveOutcome::AlreadyPresent(expected));
    }

    #[test]
    fn saved_icon_decodes_to_same_hash() {
        let dir = scratch_dir("collection-hash");
        let collection = Collection::new(&dir);
        let icon = solid(3, 5, [9, 8, 7, 6]);

        let outcome = collection.save(&icon).unwrap();
        let decoded = Bitmap::open(outcome.path()).unwrap();
        assert_eq!(decoded.hash(), icon.hash());
    }

    #[test]
    fn failed_save_is_not_reported_as_present() {
        let dir = scratch_dir("collection-failed-save");
        let collection = Collection::new(&dir);
        let icon = solid(2, 2, [4, 5, 6, 255]);
        let target = collection.path_for(&icon).unwrap();
        fs::create_dir(&target).unwrap();

        assert!(matches!(
            collection.save(&icon),
            Err(CollectionError::Bitmap(_))
        ));
        assert!(!collection.contains(&icon));
        assert!(collection.list().unwrap().is_empty());

        fs::remove_dir(&target).unwrap();
        let outcome = collection.save(&icon).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved(target));
    }

    #[test]
    fn empty_image_is_rejected() {
        let dir = scratch_dir("collection-empty");
        let collection = Collection::new(&dir);
        assert!(matches!(
            collection.save(&Bitmap::empty()),
            Err(CollectionError::EmptyImage)
        ));
        assert!(!collection.contains(&Bitmap::empty()));
    }

    #[test]
    fn list_and_remove() {
        let dir = scratch_dir("collection-list");
        let collection = Collection::new(dir.join("icons"));
        assert!(collection.list().unwrap().is_empty());

        let a = collection.save(&solid(2, 2, [1, 1, 1, 255])).unwrap();
        let b = collection.save(&solid(2, 2, [2, 2, 2, 255])).unwrap();
        fs::write(dir.join("icons").join("notes.txt"), "ignored").unwrap();

        let mut expected = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        expected.sort();
        assert_eq!(collection.list().unwrap(), expected);

        collection.remove(a.path()).unwrap();
        assert_eq!(collection.list().unwrap(), vec![b.path().to_path_buf()]);
        assert!(matches!(
            collection.remove(a.path()),
            Err(CollectionError::Io { .. })
        ));
    }
}
