//! Media source identifiers

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies a media source: a filesystem path or a named in-memory buffer.
///
/// Immutable once constructed. In-memory sources compare by name and
/// content, so two buffers registered under the same name but holding
/// different bytes are distinct sources.
#[derive(Clone)]
pub enum MediaPath {
    /// File on disk
    File(PathBuf),
    /// Bytes already in memory (e.g. an embedded asset or a download)
    Memory {
        name: String,
        data: Arc<[u8]>,
        /// BLAKE3 digest of `data`
        fingerprint: blake3::Hash,
    },
}

impl MediaPath {
    /// Filesystem source
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        MediaPath::File(path.as_ref().to_path_buf())
    }

    /// In-memory source
    pub fn memory(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let fingerprint = blake3::hash(&data);
        MediaPath::Memory {
            name: name.into(),
            data,
            fingerprint,
        }
    }

    /// Filesystem path, if any
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            MediaPath::File(path) => Some(path.as_path()),
            MediaPath::Memory { .. } => None,
        }
    }

    /// In-memory bytes, if any
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            MediaPath::File(_) => None,
            MediaPath::Memory { data, .. } => Some(&data[..]),
        }
    }

    /// Lower-cased extension of the path or buffer name
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            MediaPath::File(path) => path.file_name()?.to_string_lossy().into_owned(),
            MediaPath::Memory { name, .. } => name.clone(),
        };
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Unambiguous identity string used in cache keys.
    ///
    /// In-memory sources are identified by name, length and a 256-bit
    /// BLAKE3 digest of their bytes.
    pub fn identity(&self) -> String {
        match self {
            MediaPath::File(path) => format!("file:{}", path.to_string_lossy()),
            MediaPath::Memory {
                name,
                data,
                fingerprint,
            } => format!("mem:{}:{}:{}", name, data.len(), fingerprint.to_hex()),
        }
    }
}

impl PartialEq for MediaPath {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MediaPath::File(a), MediaPath::File(b)) => a == b,
            (
                MediaPath::Memory {
                    name: na,
                    data: da,
                    fingerprint: fa,
                },
                MediaPath::Memory {
                    name: nb,
                    data: db,
                    fingerprint: fb,
                },
            ) => na == nb && fa == fb && (Arc::ptr_eq(da, db) || da == db),
            _ => false,
        }
    }
}

impl Eq for MediaPath {}

impl Hash for MediaPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            MediaPath::File(path) => {
                0u8.hash(state);
                path.hash(state);
            }
            MediaPath::Memory {
                name, fingerprint, ..
            } => {
                1u8.hash(state);
                name.hash(state);
                fingerprint.hash(state);
            }
        }
    }
}

impl fmt::Debug for MediaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaPath::File(path) => f.debug_tuple("File").field(path).finish(),
            MediaPath::Memory { name, data, .. } => f
                .debug_struct("Memory")
                .field("name", name)
                .field("data_len", &data.len())
                .finish(),
        }
    }
}

impl fmt::Display for MediaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaPath::File(path) => write!(f, "{}", path.display()),
            MediaPath::Memory { name, .. } => write!(f, "memory:{}", name),
        }
    }
}

impl From<&str> for MediaPath {
    fn from(s: &str) -> Self {
        MediaPath::file(s)
    }
}

impl From<PathBuf> for MediaPath {
    fn from(path: PathBuf) -> Self {
        MediaPath::File(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(MediaPath::file("/a/b/Clip.MOV").extension().as_deref(), Some("mov"));
        assert_eq!(MediaPath::file("/a/b/render.0001.exr").extension().as_deref(), Some("exr"));
        assert_eq!(MediaPath::file("/a/b/noext").extension(), None);
        assert_eq!(MediaPath::file("/a/b/.hidden").extension(), None);
        assert_eq!(
            MediaPath::memory("logo.png", vec![1u8, 2, 3]).extension().as_deref(),
            Some("png")
        );
    }

    #[test]
    fn test_memory_identity_includes_content() {
        let a = MediaPath::memory("clip.wav", vec![1u8, 2, 3]);
        let b = MediaPath::memory("clip.wav", vec![1u8, 2, 4]);
        let c = MediaPath::memory("clip.wav", vec![1u8, 2, 3]);
        assert_ne!(a, b);
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a, c);
        assert_eq!(a.identity(), c.identity());
    }

    #[test]
    fn test_memory_identity_uses_full_digest() {
        let data = vec![7u8; 64];
        let a = MediaPath::memory("clip.wav", data.clone());
        let expected = format!("mem:clip.wav:64:{}", blake3::hash(&data).to_hex());
        assert_eq!(a.identity(), expected);

        // Same name and length, one byte apart
        let mut changed = data;
        changed[63] = 8;
        let b = MediaPath::memory("clip.wav", changed);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_file_and_memory_never_equal() {
        let file = MediaPath::file("clip.wav");
        let mem = MediaPath::memory("clip.wav", Vec::<u8>::new());
        assert_ne!(file, mem);
        assert_ne!(file.identity(), mem.identity());
    }
}
