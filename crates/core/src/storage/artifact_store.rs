use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::identification::domain::identification_label::IdentificationLabel;
use crate::shared::constants::{
    DIR_CROPS, FILE_BBOXES, FILE_EMBEDS, FILE_IDENTITIES, FILE_METADATA,
};
use crate::shared::face_record::{FaceId, FaceRecord};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("crop {face_id} is not a 3-channel image")]
    CropFormat { face_id: FaceId },
}

/// Detection outputs a run can leave out. Metadata is always written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionComponent {
    FaceDetection,
    FaceEmbedding,
    FaceCrops,
}

/// Per-video artifact directory: `<root>/<video stem>/`.
#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store for `video` under `root`, named after the video's file stem.
    pub fn for_video(root: &Path, video: &Path) -> Self {
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Self::new(root.join(stem))
    }

    /// One store per subdirectory of `root`, sorted by name.
    pub fn discover(root: &Path) -> Result<Vec<ArtifactStore>, StoreError> {
        let entries = fs::read_dir(root).map_err(|e| io_error(root, e))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(root, e))?.path();
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if path.is_dir() && !hidden {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs.into_iter().map(ArtifactStore::new).collect())
    }

    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(FILE_METADATA)
    }

    pub fn bboxes_path(&self) -> PathBuf {
        self.dir.join(FILE_BBOXES)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(FILE_EMBEDS)
    }

    pub fn identities_path(&self) -> PathBuf {
        self.dir.join(FILE_IDENTITIES)
    }

    pub fn crops_dir(&self) -> PathBuf {
        self.dir.join(DIR_CROPS)
    }

    pub fn crop_path(&self, face_id: FaceId) -> PathBuf {
        self.crops_dir().join(format!("{face_id}.png"))
    }

    /// True when a previous detection run left well-formed output.
    ///
    /// Components in `disabled` are not required; metadata always is.
    pub fn has_detection_output(&self, disabled: &[DetectionComponent]) -> bool {
        let wanted = |c: DetectionComponent| !disabled.contains(&c);
        json_is_valid(&self.metadata_path())
            && (!wanted(DetectionComponent::FaceDetection) || json_is_valid(&self.bboxes_path()))
            && (!wanted(DetectionComponent::FaceEmbedding)
                || json_is_valid(&self.embeddings_path()))
            && (!wanted(DetectionComponent::FaceCrops) || self.has_crops())
    }

    /// Empty sibling directory (`.<name>.staging`) to write a new run into.
    ///
    /// Leftovers from an interrupted run are removed first.
    pub fn stage(&self) -> Result<ArtifactStore, StoreError> {
        let staged = self.sibling("staging");
        remove_dir_if_present(&staged.dir)?;
        fs::create_dir_all(&staged.dir).map_err(|e| io_error(&staged.dir, e))?;
        Ok(staged)
    }

    /// Moves `staged` into place, replacing any previous output.
    ///
    /// Entries the staged run did not write carry over from the old
    /// directory, except identities, whose face ids belong to the old run.
    pub fn commit(&self, staged: ArtifactStore) -> Result<(), StoreError> {
        if !self.dir.exists() {
            return rename(&staged.dir, &self.dir);
        }

        let replaced = self.sibling("replaced");
        remove_dir_if_present(&replaced.dir)?;
        rename(&self.dir, &replaced.dir)?;
        rename(&staged.dir, &self.dir)?;

        let entries = fs::read_dir(&replaced.dir).map_err(|e| io_error(&replaced.dir, e))?;
        for entry in entries {
            let old = entry.map_err(|e| io_error(&replaced.dir, e))?.path();
            let Some(file_name) = old.file_name() else {
                continue;
            };
            let target = self.dir.join(file_name);
            if file_name == FILE_IDENTITIES {
                log::info!("Dropping identities of the replaced run in {}", self.name());
            } else if !target.exists() {
                rename(&old, &target)?;
            }
        }
        remove_dir_if_present(&replaced.dir)
    }

    /// Deletes a staged run that will not be committed.
    pub fn discard(self) {
        if let Err(e) = remove_dir_if_present(&self.dir) {
            log::warn!("Could not remove {}: {e}", self.dir.display());
        }
    }

    fn sibling(&self, suffix: &str) -> ArtifactStore {
        ArtifactStore::new(self.dir.with_file_name(format!(".{}.{suffix}", self.name())))
    }

    pub fn has_crops(&self) -> bool {
        self.crops_dir().is_dir()
    }

    pub fn has_identities(&self) -> bool {
        self.identities_path().exists()
    }

    pub fn save_metadata(&self, metadata: &VideoMetadata) -> Result<(), StoreError> {
        save_json(&self.metadata_path(), metadata)
    }

    pub fn load_metadata(&self) -> Result<VideoMetadata, StoreError> {
        load_json(&self.metadata_path())
    }

    pub fn save_bboxes(&self, records: &[(FaceId, FaceRecord)]) -> Result<(), StoreError> {
        save_json(&self.bboxes_path(), records)
    }

    pub fn load_bboxes(&self) -> Result<Vec<(FaceId, FaceRecord)>, StoreError> {
        load_json(&self.bboxes_path())
    }

    pub fn save_embeddings(&self, embeddings: &[(FaceId, Vec<f32>)]) -> Result<(), StoreError> {
        save_json(&self.embeddings_path(), embeddings)
    }

    pub fn load_embeddings(&self) -> Result<Vec<(FaceId, Vec<f32>)>, StoreError> {
        load_json(&self.embeddings_path())
    }

    pub fn save_identities(&self, labels: &[IdentificationLabel]) -> Result<(), StoreError> {
        save_json(&self.identities_path(), labels)
    }

    pub fn load_identities(&self) -> Result<Vec<IdentificationLabel>, StoreError> {
        load_json(&self.identities_path())
    }

    /// Writes every crop as `crops/<face_id>.png`.
    pub fn save_crops(&self, crops: &[(FaceId, Frame)]) -> Result<(), StoreError> {
        let dir = self.crops_dir();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        for (face_id, crop) in crops {
            let path = self.crop_path(*face_id);
            let img = crop
                .to_rgb_image()
                .map_err(|_| StoreError::CropFormat { face_id: *face_id })?;
            img.save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| StoreError::Image { path, source: e })?;
        }
        Ok(())
    }

    /// Lists crop files ordered by numeric face id.
    ///
    /// Files whose stem is not a face id are ignored.
    pub fn list_crops(&self) -> Result<Vec<(FaceId, PathBuf)>, StoreError> {
        let dir = self.crops_dir();
        let entries = fs::read_dir(&dir).map_err(|e| io_error(&dir, e))?;

        let mut crops = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&dir, e))?.path();
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<FaceId>().ok());
            match id {
                Some(id) => crops.push((id, path)),
                None => log::debug!("Ignoring non-crop file {}", path.display()),
            }
        }
        crops.sort_by_key(|(id, _)| *id);
        Ok(crops)
    }

    pub fn load_crop(path: &Path) -> Result<Frame, StoreError> {
        let img = image::open(path).map_err(|e| StoreError::Image {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Frame::from_rgb_image(img.to_rgb8(), 0))
    }
}

/// True when `path` exists and parses as JSON.
pub fn json_is_valid(path: &Path) -> bool {
    fs::File::open(path)
        .ok()
        .map(|f| serde_json::from_reader::<_, serde_json::Value>(BufReader::new(f)).is_ok())
        .unwrap_or(false)
}

fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let file = fs::File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    writer.flush().map_err(|e| io_error(path, e))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = fs::File::open(path).map_err(|e| io_error(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(|e| io_error(from, e))
}

fn remove_dir_if_present(dir: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_error(dir, e)),
        _ => Ok(()),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
