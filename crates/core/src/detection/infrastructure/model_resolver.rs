//! Locates the detect-stage ONNX models, downloading them into the user
//! cache the first time they are needed.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("no user cache directory on this platform")]
    NoCacheDir,
    #[error("cannot download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Called with `(bytes so far, total bytes)`; total is 0 when unknown.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// A model file and where to fetch it from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub url: &'static str,
    /// Human-readable role, used in progress output.
    pub label: &'static str,
}

pub const FACE_DETECTION_MODEL: ModelSpec = ModelSpec {
    name: YOLO_MODEL_NAME,
    url: YOLO_MODEL_URL,
    label: "face detection",
};

pub const FACE_EMBEDDING_MODEL: ModelSpec = ModelSpec {
    name: EMBEDDING_MODEL_NAME,
    url: EMBEDDING_MODEL_URL,
    label: "face embedding",
};

/// Paths of both models the detect stage loads.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionModels {
    pub detector: PathBuf,
    pub embedder: PathBuf,
}

/// Looks models up in a cache directory, then in an optional bundled
/// directory, and downloads misses into the cache.
#[derive(Clone, Debug)]
pub struct ModelResolver {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
}

impl ModelResolver {
    pub fn new(cache_dir: impl Into<PathBuf>, bundled_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bundled_dir,
        }
    }

    /// Resolver backed by [`user_cache_dir`].
    pub fn with_user_cache(bundled_dir: Option<PathBuf>) -> Result<Self, ModelResolveError> {
        Ok(Self::new(user_cache_dir()?, bundled_dir))
    }

    pub fn detection_models(
        &self,
        progress: impl Fn(&ModelSpec) -> Option<ProgressFn>,
    ) -> Result<DetectionModels, ModelResolveError> {
        Ok(DetectionModels {
            detector: self.resolve(&FACE_DETECTION_MODEL, progress(&FACE_DETECTION_MODEL))?,
            embedder: self.resolve(&FACE_EMBEDDING_MODEL, progress(&FACE_EMBEDDING_MODEL))?,
        })
    }

    pub fn resolve(
        &self,
        model: &ModelSpec,
        progress: Option<ProgressFn>,
    ) -> Result<PathBuf, ModelResolveError> {
        if let Some(found) = self.find_local(model.name) {
            log::debug!("Using {} model {}", model.label, found.display());
            return Ok(found);
        }

        log::info!("Downloading {} model from {}", model.label, model.url);
        fs::create_dir_all(&self.cache_dir).map_err(|e| write_error(&self.cache_dir, e))?;
        let dest = self.cache_dir.join(model.name);
        download(model.url, &dest, progress)?;
        Ok(dest)
    }

    fn find_local(&self, name: &str) -> Option<PathBuf> {
        std::iter::once(self.cache_dir.as_path())
            .chain(self.bundled_dir.as_deref())
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }
}

/// `<platform cache>/FaceIngest/models`.
pub fn user_cache_dir() -> Result<PathBuf, ModelResolveError> {
    dirs::cache_dir()
        .map(|d| d.join("FaceIngest").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

/// Streams `url` into `<dest>.part`, renamed over `dest` once complete.
fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let partial = dest.with_extension("part");
    let result = fetch_into(url, &partial, progress)
        .and_then(|()| fs::rename(&partial, dest).map_err(|e| write_error(dest, e)));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn fetch_into(
    url: &str,
    path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| ModelResolveError::Download {
            url: url.to_string(),
            source,
        })?;

    let file = fs::File::create(path).map_err(|e| write_error(path, e))?;
    let mut writer = ProgressWriter::new(BufWriter::new(file), response.content_length(), progress);
    io::copy(&mut response, &mut writer).map_err(|e| write_error(path, e))?;
    writer.flush().map_err(|e| write_error(path, e))
}

/// Reports the running byte count after every write.
struct ProgressWriter<W> {
    inner: W,
    written: u64,
    total: u64,
    progress: Option<ProgressFn>,
}

impl<W: Write> ProgressWriter<W> {
    fn new(inner: W, total: Option<u64>, progress: Option<ProgressFn>) -> Self {
        Self {
            inner,
            written: 0,
            total: total.unwrap_or(0),
            progress,
        }
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if let Some(progress) = &self.progress {
            progress(self.written, self.total);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_error(path: &Path, source: io::Error) -> ModelResolveError {
    ModelResolveError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const TEST_MODEL: ModelSpec = ModelSpec {
        name: "m.onnx",
        url: "http://127.0.0.1:9/m.onnx",
        label: "test",
    };

    fn dirs_with(cache: &[&str], bundled: &[&str]) -> (TempDir, ModelResolver) {
        let tmp = TempDir::new().unwrap();
        let cache_dir = tmp.path().join("cache");
        let bundled_dir = tmp.path().join("bundled");
        for (dir, names) in [(&cache_dir, cache), (&bundled_dir, bundled)] {
            fs::create_dir_all(dir).unwrap();
            for name in names {
                fs::write(dir.join(name), dir.to_string_lossy().as_bytes()).unwrap();
            }
        }
        (tmp, ModelResolver::new(cache_dir, Some(bundled_dir)))
    }

    #[test]
    fn test_cache_wins_over_bundled() {
        let (tmp, resolver) = dirs_with(&["m.onnx"], &["m.onnx"]);
        let found = resolver.resolve(&TEST_MODEL, None).unwrap();
        assert_eq!(found, tmp.path().join("cache").join("m.onnx"));
    }

    #[test]
    fn test_bundled_used_when_cache_misses() {
        let (tmp, resolver) = dirs_with(&[], &["m.onnx"]);
        let found = resolver.resolve(&TEST_MODEL, None).unwrap();
        assert_eq!(found, tmp.path().join("bundled").join("m.onnx"));
    }

    #[test]
    fn test_directory_with_model_name_is_not_a_model() {
        let (tmp, resolver) = dirs_with(&[], &[]);
        fs::create_dir(tmp.path().join("cache").join("m.onnx")).unwrap();
        assert_eq!(resolver.find_local("m.onnx"), None);
    }

    #[test]
    fn test_detection_models_resolve_from_cache_without_progress() {
        let (tmp, resolver) = dirs_with(&[YOLO_MODEL_NAME], &[EMBEDDING_MODEL_NAME]);
        let asked = Mutex::new(Vec::new());

        let models = resolver
            .detection_models(|model| {
                asked.lock().unwrap().push(model.label);
                None
            })
            .unwrap();

        assert_eq!(models.detector, tmp.path().join("cache").join(YOLO_MODEL_NAME));
        assert_eq!(models.embedder, tmp.path().join("bundled").join(EMBEDDING_MODEL_NAME));
        assert_eq!(*asked.lock().unwrap(), vec!["face detection", "face embedding"]);
    }

    #[test]
    fn test_failed_download_leaves_no_files() {
        let (tmp, resolver) = dirs_with(&[], &[]);
        let result = resolver.resolve(&TEST_MODEL, None);

        assert!(matches!(result, Err(ModelResolveError::Download { .. })));
        let cache = tmp.path().join("cache");
        assert!(!cache.join("m.onnx").exists());
        assert!(!cache.join("m.part").exists());
    }

    #[test]
    fn test_progress_writer_reports_running_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn =
            Box::new(move |done, total| sink.lock().unwrap().push((done, total)));

        let mut writer = ProgressWriter::new(Vec::new(), Some(7), Some(progress));
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"defg").unwrap();

        assert_eq!(writer.inner, b"abcdefg");
        assert_eq!(*seen.lock().unwrap(), vec![(3, 7), (7, 7)]);
    }

    #[test]
    fn test_user_cache_dir_is_namespaced() {
        if let Ok(dir) = user_cache_dir() {
            assert!(dir.ends_with(Path::new("FaceIngest").join("models")));
        }
    }
}
