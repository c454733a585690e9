//! Single-slot durable cache for the last saved detection.
//!
//! A saved record holds one detection plus the frame it was seen in. The
//! frame's RGBA bytes are base64 encoded and then LZ-string compressed to
//! UTF-16 text, so the whole record is one JSON string in a key-value slot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::module::vision::overlay::{Surface, SurfaceError};
use crate::module::vision::{Detection, Frame};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] io::Error),
    #[error("record serialization: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pixel data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("nothing to save: no detection")]
    NoDetection,
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// String-keyed durable storage.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        // Readers see either the old or the new value, never a partial write.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// What is persisted in the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDetectionRecord {
    pub det_data: Detection,
    pub img_data: String,
    pub img_width: u32,
    pub img_height: u32,
}

/// A record read back with its pixels recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDetection {
    pub record: SavedDetectionRecord,
    pub frame: Frame,
}

impl LoadedDetection {
    /// The record without `img_data`, as indented JSON.
    pub fn describe(&self) -> Result<String, StoreError> {
        let mut value = serde_json::to_value(&self.record)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("img_data");
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

/// Encodes RGBA bytes as compressed text.
pub fn encode_pixels(data: &[u8]) -> String {
    let text = BASE64_STANDARD.encode(data);
    lz_str::compress_to_utf16(text.as_str())
}

/// Reverses `encode_pixels`.
pub fn decode_pixels(encoded: &str) -> Result<Vec<u8>, StoreError> {
    let wide = lz_str::decompress_from_utf16(encoded)
        .ok_or_else(|| StoreError::Corrupt("img_data does not decompress".to_string()))?;
    let text = String::from_utf16(&wide)
        .map_err(|e| StoreError::Corrupt(format!("img_data is not text: {e}")))?;
    Ok(BASE64_STANDARD.decode(text)?)
}

/// Last-write-wins cache of one saved detection.
pub struct PersistenceCache<T: Store> {
    store: T,
    key: String,
}

impl<T: Store> PersistenceCache<T> {
    pub fn new(store: T, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    /// Saves `frame` with the first of `detections`, replacing any previous record.
    pub fn save(&mut self, frame: &Frame, detections: &[Detection]) -> Result<(), StoreError> {
        let det = detections.first().ok_or(StoreError::NoDetection)?;
        let record = SavedDetectionRecord {
            det_data: det.clone(),
            img_data: encode_pixels(&frame.data),
            img_width: frame.width,
            img_height: frame.height,
        };
        self.store.set(&self.key, &serde_json::to_string(&record)?)?;
        log::info!(
            "Saved detection {} with {}x{} frame",
            det.id,
            frame.width,
            frame.height
        );
        Ok(())
    }

    /// Reads the slot. An empty slot is not an error.
    pub fn load(&self) -> Result<Option<LoadedDetection>, StoreError> {
        let Some(text) = self.store.get(&self.key)? else {
            log::info!("{} not found", self.key);
            return Ok(None);
        };
        let record: SavedDetectionRecord = serde_json::from_str(&text)?;
        let pixels = decode_pixels(&record.img_data)?;
        let frame = Frame::from_raw(record.img_width, record.img_height, pixels).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "pixel data does not match {}x{}",
                record.img_width, record.img_height
            ))
        })?;
        Ok(Some(LoadedDetection { record, frame }))
    }

    /// Loads the slot and shows it in `viewer`.
    pub fn load_into<S: Surface>(
        &self,
        viewer: &mut SavedViewer<S>,
    ) -> Result<Option<LoadedDetection>, StoreError> {
        let loaded = self.load()?;
        if let Some(saved) = &loaded {
            viewer.show(saved)?;
        }
        Ok(loaded)
    }
}

/// Display area for the saved detection: an image surface and a read-only text field.
pub struct SavedViewer<S: Surface> {
    pub surface: S,
    text: String,
    text_output: Option<PathBuf>,
}

impl<S: Surface> SavedViewer<S> {
    pub fn new(surface: S, text_output: Option<PathBuf>) -> Self {
        Self {
            surface,
            text: String::new(),
            text_output,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn show(&mut self, saved: &LoadedDetection) -> Result<(), StoreError> {
        self.surface
            .resize(saved.record.img_width, saved.record.img_height);
        self.surface.put_image(&saved.frame);
        self.text = saved.describe()?;
        self.surface.present()?;
        if let Some(path) = &self.text_output {
            fs::write(path, &self.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::vision::overlay::RgbaCanvas;
    use crate::module::vision::Point;

    fn frame(width: u32, height: u32) -> Frame {
        let data = (0..width * height * 4).map(|i| (i * 7 % 256) as u8).collect();
        Frame::from_raw(width, height, data).unwrap()
    }

    fn det(id: i32) -> Detection {
        Detection::new(
            id,
            [
                Point { x: 1.0, y: 1.0 },
                Point { x: 5.0, y: 1.0 },
                Point { x: 5.0, y: 5.0 },
                Point { x: 1.0, y: 5.0 },
            ],
            Point { x: 3.0, y: 3.0 },
        )
    }

    fn cache(dir: &Path) -> PersistenceCache<FileStore> {
        PersistenceCache::new(FileStore::new(dir), "detectData")
    }

    #[test]
    fn save_then_load_restores_frame_and_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        let f = frame(13, 7);
        cache.save(&f, &[det(12), det(40)]).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.frame, f);
        assert_eq!(loaded.record.img_width, 13);
        assert_eq!(loaded.record.img_height, 7);
        assert_eq!(loaded.record.det_data.id, 12);
    }

    #[test]
    fn load_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        cache.save(&frame(4, 4), &[det(1)]).unwrap();
        assert_eq!(cache.load().unwrap(), cache.load().unwrap());
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        cache.save(&frame(4, 4), &[det(1)]).unwrap();
        cache.save(&frame(2, 3), &[det(2)]).unwrap();
        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.record.det_data.id, 2);
        assert_eq!(loaded.frame, frame(2, 3));
        // Only the slot file remains.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn empty_slot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cache(dir.path()).load().unwrap().is_none());
    }

    #[test]
    fn save_requires_a_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        assert!(matches!(
            cache.save(&frame(2, 2), &[]),
            Err(StoreError::NoDetection)
        ));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn record_uses_slot_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        cache.save(&frame(2, 2), &[det(9)]).unwrap();
        let raw = FileStore::new(dir.path()).get("detectData").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["det_data"]["id"], 9);
        assert_eq!(value["img_width"], 2);
        assert_eq!(value["img_height"], 2);
        assert!(value["img_data"].is_string());
    }

    #[test]
    fn corrupt_pixels_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let record = SavedDetectionRecord {
            det_data: det(1),
            img_data: encode_pixels(&[1, 2, 3]),
            img_width: 2,
            img_height: 2,
        };
        store
            .set("detectData", &serde_json::to_string(&record).unwrap())
            .unwrap();
        assert!(matches!(
            cache(dir.path()).load(),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn pixel_codec_round_trip() {
        let data: Vec<u8> = (0..=255).chain((0..=255).rev()).collect();
        assert_eq!(decode_pixels(&encode_pixels(&data)).unwrap(), data);
    }

    #[test]
    fn viewer_shows_saved_record() {
        let dir = tempfile::tempdir().unwrap();
        let text_path = dir.path().join("saved_det.json");
        let mut cache = cache(dir.path());
        let f = frame(6, 5);
        cache.save(&f, &[det(77)]).unwrap();

        let mut viewer = SavedViewer::new(RgbaCanvas::new(1, 1, None), Some(text_path.clone()));
        let loaded = cache.load_into(&mut viewer).unwrap().unwrap();
        assert_eq!(loaded.record.det_data.id, 77);
        assert_eq!(viewer.surface.dimensions(), (6, 5));
        assert_eq!(viewer.surface.snapshot(), f);

        let shown: serde_json::Value = serde_json::from_str(viewer.text()).unwrap();
        assert!(shown.get("img_data").is_none());
        assert_eq!(shown["det_data"]["id"], 77);
        assert_eq!(fs::read_to_string(text_path).unwrap(), viewer.text());
    }

    #[test]
    fn viewer_untouched_when_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = SavedViewer::new(RgbaCanvas::new(3, 3, None), None);
        assert!(cache(dir.path()).load_into(&mut viewer).unwrap().is_none());
        assert_eq!(viewer.surface.dimensions(), (3, 3));
        assert!(viewer.text().is_empty());
    }
}
