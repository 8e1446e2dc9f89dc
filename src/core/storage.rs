//! Key/blob storage for computed spectra and detected peaks.
//!
//! The pipeline only depends on the [`SpectrumStore`] trait. Two stores are
//! provided:
//! - [`JsonFileStore`] writes `<key>.spectrum` and `<key>.peaks` JSON files
//!   into a directory
//! - [`MemoryStore`] keeps spectra in memory (tests, embedding)

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::csi::RecordKey;
use super::spectrum::{Peak, Spectrum};

/// Errors that can occur while reading or writing stored artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error for '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed spectrum for key '{0}'")]
    MalformedSpectrum(RecordKey),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Persisted spectrum layout.
#[derive(Debug, Serialize, Deserialize)]
struct SpectrumFile {
    music_spec_db: Vec<Vec<f64>>,
}

/// Persisted peak list layout.
#[derive(Debug, Serialize, Deserialize)]
struct PeaksFile {
    peaks: Vec<Peak>,
}

/// Key → spectrum cache consulted before running MUSIC.
pub trait SpectrumStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &RecordKey) -> Result<Option<Spectrum>>;

    fn put(&self, key: &RecordKey, spectrum: &Spectrum) -> Result<()>;

    /// Persists the peaks detected for `key`. Stores that only cache
    /// spectra can ignore this.
    fn put_peaks(&self, _key: &RecordKey, _peaks: &[Peak]) -> Result<()> {
        Ok(())
    }
}

/// Directory-backed JSON store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn spectrum_path(&self, key: &RecordKey) -> PathBuf {
        self.root.join(format!("{}.spectrum", key))
    }

    pub fn peaks_path(&self, key: &RecordKey) -> PathBuf {
        self.root.join(format!("{}.peaks", key))
    }

    /// Reads peaks previously saved with [`SpectrumStore::put_peaks`].
    pub fn load_peaks(&self, key: &RecordKey) -> Result<Option<Vec<Peak>>> {
        let path = self.peaks_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let file: PeaksFile = read_json(&path)?;
        Ok(Some(file.peaks))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StorageError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let file = File::create(path).map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| StorageError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    writer.flush().map_err(|e| StorageError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

impl SpectrumStore for JsonFileStore {
    fn get(&self, key: &RecordKey) -> Result<Option<Spectrum>> {
        let path = self.spectrum_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let file: SpectrumFile = read_json(&path)?;
        let spectrum = Spectrum::from_rows(file.music_spec_db)
            .map_err(|_| StorageError::MalformedSpectrum(key.clone()))?;
        Ok(Some(spectrum))
    }

    fn put(&self, key: &RecordKey, spectrum: &Spectrum) -> Result<()> {
        let file = SpectrumFile {
            music_spec_db: spectrum.to_rows(),
        };
        write_json(&self.spectrum_path(key), &file)
    }

    fn put_peaks(&self, key: &RecordKey, peaks: &[Peak]) -> Result<()> {
        let file = PeaksFile {
            peaks: peaks.to_vec(),
        };
        write_json(&self.peaks_path(key), &file)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    spectra: RwLock<HashMap<RecordKey, Spectrum>>,
    peaks: RwLock<HashMap<RecordKey, Vec<Peak>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached spectra.
    pub fn len(&self) -> usize {
        self.spectra.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peaks(&self, key: &RecordKey) -> Option<Vec<Peak>> {
        self.peaks.read().ok()?.get(key).cloned()
    }
}

impl SpectrumStore for MemoryStore {
    fn get(&self, key: &RecordKey) -> Result<Option<Spectrum>> {
        let spectra = self.spectra.read().map_err(|_| StorageError::Poisoned)?;
        Ok(spectra.get(key).cloned())
    }

    fn put(&self, key: &RecordKey, spectrum: &Spectrum) -> Result<()> {
        let mut spectra = self.spectra.write().map_err(|_| StorageError::Poisoned)?;
        spectra.insert(key.clone(), spectrum.clone());
        Ok(())
    }

    fn put_peaks(&self, key: &RecordKey, peaks: &[Peak]) -> Result<()> {
        let mut stored = self.peaks.write().map_err(|_| StorageError::Poisoned)?;
        stored.insert(key.clone(), peaks.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn synthetic_spectrum() -> Spectrum {
        let values = (0..12).map(|i| (i as f64 * 0.37).sin() * 10.0 - 1e-3).collect();
        Spectrum::new(3, 4, values).unwrap()
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = RecordKey::from("packet_0");
        let spectrum = synthetic_spectrum();

        store.put(&key, &spectrum).unwrap();
        let loaded = store.get(&key).unwrap().expect("stored spectrum");

        assert_eq!(loaded.shape(), spectrum.shape());
        for (a, b) in loaded.values().iter().zip(spectrum.values()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_json_store_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = RecordKey::from("rec");
        store
            .put(&key, &Spectrum::new(1, 2, vec![1.5, -2.0]).unwrap())
            .unwrap();

        let content = fs::read_to_string(dir.path().join("rec.spectrum")).unwrap();
        assert_eq!(content, r#"{"music_spec_db":[[1.5,-2.0]]}"#);
    }

    #[test]
    fn test_json_store_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.get(&RecordKey::from("absent")).unwrap().is_none());
    }

    #[test]
    fn test_json_store_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(dir.path().join("bad.spectrum"), "not json").unwrap();

        let result = store.get(&RecordKey::from("bad"));
        assert!(matches!(result, Err(StorageError::Json { .. })));
    }

    #[test]
    fn test_json_store_ragged_spectrum() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(
            dir.path().join("ragged.spectrum"),
            r#"{"music_spec_db":[[1.0,2.0],[3.0]]}"#,
        )
        .unwrap();

        let result = store.get(&RecordKey::from("ragged"));
        assert!(matches!(result, Err(StorageError::MalformedSpectrum(_))));
    }

    #[test]
    fn test_json_store_peaks() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        let key = RecordKey::from("rec");
        let peaks = vec![Peak::new(0.1, 2e-9, 5.0), Peak::new(-0.3, 0.0, 4.0)];

        store.put_peaks(&key, &peaks).unwrap();

        let content = fs::read_to_string(store.peaks_path(&key)).unwrap();
        assert!(content.starts_with(r#"{"peaks":[[0.1,"#));
        assert_eq!(store.load_peaks(&key).unwrap(), Some(peaks));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let key = RecordKey::from("k");
        assert!(store.is_empty());
        assert!(store.get(&key).unwrap().is_none());

        store.put(&key, &synthetic_spectrum()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap(), Some(synthetic_spectrum()));
    }
}
