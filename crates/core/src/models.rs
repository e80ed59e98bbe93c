//! Inpainting model catalog and weight storage.
//!
//! Model weights live as `.onnx` files under a models directory. The
//! registry knows the built-in catalog, downloads weights with hash
//! verification, and loads them into memory for session construction.
//! Fetch and storage failures surface as [`Error::SessionInit`], matching
//! how they present to a pipeline caller.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// The model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "lama";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub filename: String,
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub description: String,
}

fn builtin_catalog() -> Vec<ModelEntry> {
    vec![ModelEntry {
        name: "lama".into(),
        filename: "lama_fp32.onnx".into(),
        url: Some(
            "https://huggingface.co/Carve/LaMa-ONNX/resolve/main/lama_fp32.onnx".into(),
        ),
        sha256: None,
        description: "LaMa large-mask inpainting, FP32 (image + mask inputs, ~200 MB)".into(),
    }]
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models_dir: PathBuf,
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            entries: Vec::new(),
        }
    }

    pub fn with_builtin_models(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            entries: builtin_catalog(),
        }
    }

    /// Register `.onnx` files already present in the models directory that
    /// the catalog does not know about.
    pub fn discover(&mut self) -> Result<()> {
        let dir = &self.models_dir;
        if !dir.exists() {
            return Ok(());
        }

        let read_dir = fs::read_dir(dir).map_err(|e| {
            Error::session_init(format!("cannot read models directory {}: {e}", dir.display()))
        })?;

        for entry in read_dir.flatten() {
            let path = entry.path();
            let is_onnx = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("onnx"))
                .unwrap_or(false);
            if !is_onnx {
                continue;
            }

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if self.entries.iter().any(|e| e.filename == filename) {
                continue;
            }

            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&filename)
                .to_string();

            info!(filename = %filename, "Discovered unknown ONNX model");
            self.entries.push(ModelEntry {
                name,
                filename,
                url: None,
                sha256: None,
                description: "Discovered model (metadata unknown)".into(),
            });
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn list(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn is_downloaded(&self, name: &str) -> bool {
        self.get(name)
            .map(|e| self.models_dir.join(&e.filename).is_file())
            .unwrap_or(false)
    }

    pub fn model_path(&self, name: &str) -> Option<PathBuf> {
        self.get(name).map(|e| self.models_dir.join(&e.filename))
    }

    /// Read the model's weight bytes from disk.
    pub fn load_bytes(&self, name: &str) -> Result<Vec<u8>> {
        let path = self
            .model_path(name)
            .ok_or_else(|| Error::session_init(format!("unknown model: {name}")))?;
        fs::read(&path).map_err(|e| {
            Error::session_init(format!("cannot read model weights {}: {e}", path.display()))
        })
    }

    /// Download a model's weights: temp file, optional SHA256 verification,
    /// atomic rename into place.
    pub fn download(&self, name: &str) -> Result<PathBuf> {
        let entry = self
            .get(name)
            .ok_or_else(|| Error::session_init(format!("unknown model: {name}")))?;

        let url = entry
            .url
            .as_deref()
            .ok_or_else(|| Error::session_init(format!("no download URL for model: {name}")))?;

        fs::create_dir_all(&self.models_dir).map_err(|e| {
            Error::session_init(format!(
                "cannot create models directory {}: {e}",
                self.models_dir.display()
            ))
        })?;

        let final_path = self.models_dir.join(&entry.filename);
        let tmp_path = self.models_dir.join(format!("{}.part", entry.filename));

        info!(model = %name, url = %url, "Downloading model weights");

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(30 * 60))
            .build()
            .map_err(|e| Error::session_init(format!("cannot build HTTP client: {e}")))?;

        let mut response = client
            .get(url)
            .send()
            .map_err(|e| Error::session_init(format!("download of {name} failed to start: {e}")))?;

        if !response.status().is_success() {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::session_init(format!(
                "download of {name} returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let mut tmp_file = fs::File::create(&tmp_path).map_err(|e| {
            Error::session_init(format!("cannot create {}: {e}", tmp_path.display()))
        })?;

        if let Err(e) = response.copy_to(&mut tmp_file) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::session_init(format!(
                "download of {name} from {url} failed: {e}"
            )));
        }

        if let Some(expected_hash) = &entry.sha256 {
            info!(model = %name, "Verifying SHA256 hash");
            let actual_hash = sha256_file(&tmp_path)?;
            if actual_hash != *expected_hash {
                let _ = fs::remove_file(&tmp_path);
                return Err(Error::session_init(format!(
                    "SHA256 mismatch for {name}: expected {expected_hash}, got {actual_hash}"
                )));
            }
        } else {
            warn!(model = %name, "No SHA256 hash configured — skipping verification");
        }

        fs::rename(&tmp_path, &final_path).map_err(|e| {
            Error::session_init(format!(
                "cannot move {} into place: {e}",
                tmp_path.display()
            ))
        })?;

        info!(model = %name, path = %final_path.display(), "Download complete");
        Ok(final_path)
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| Error::session_init(format!("cannot open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::session_init(format!("read failed for {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_catalog_contains_default_model() {
        let reg = ModelRegistry::with_builtin_models(PathBuf::from("models"));
        let lama = reg.get(DEFAULT_MODEL).expect("default model present");
        assert_eq!(lama.filename, "lama_fp32.onnx");
        assert!(lama.url.is_some());
    }

    #[test]
    fn get_missing_model() {
        let reg = ModelRegistry::with_builtin_models(PathBuf::from("models"));
        assert!(reg.get("nonexistent").is_none());
        assert!(reg.model_path("nonexistent").is_none());
    }

    #[test]
    fn is_downloaded_reflects_filesystem() {
        let dir = tempdir().expect("tempdir");
        let reg = ModelRegistry::with_builtin_models(dir.path().to_path_buf());
        assert!(!reg.is_downloaded(DEFAULT_MODEL));

        fs::write(dir.path().join("lama_fp32.onnx"), b"fake weights").unwrap();
        assert!(reg.is_downloaded(DEFAULT_MODEL));
    }

    #[test]
    fn load_bytes_reads_weights() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("lama_fp32.onnx"), b"fake weights").unwrap();
        let reg = ModelRegistry::with_builtin_models(dir.path().to_path_buf());
        let bytes = reg.load_bytes(DEFAULT_MODEL).expect("load");
        assert_eq!(bytes, b"fake weights");
    }

    #[test]
    fn load_bytes_unknown_model_is_session_init_error() {
        let reg = ModelRegistry::new(PathBuf::from("models"));
        let err = reg.load_bytes("ghost").expect_err("unknown model");
        assert!(matches!(err, Error::SessionInit { .. }));
    }

    #[test]
    fn download_without_url_fails() {
        let dir = tempdir().expect("tempdir");
        let mut reg = ModelRegistry::new(dir.path().to_path_buf());
        fs::write(dir.path().join("local_only.onnx"), b"weights").unwrap();
        reg.discover().expect("discover");

        let err = reg.download("local_only").expect_err("no URL");
        assert!(matches!(err, Error::SessionInit { .. }));
        assert!(err.to_string().contains("no download URL"));
    }

    #[test]
    fn discover_registers_unknown_onnx_files_only() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("custom.onnx"), b"weights").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let mut reg = ModelRegistry::with_builtin_models(dir.path().to_path_buf());
        reg.discover().expect("discover");

        assert_eq!(reg.list().len(), 2);
        assert!(reg.get("custom").is_some());
    }

    #[test]
    fn discover_nonexistent_dir_is_ok() {
        let mut reg = ModelRegistry::with_builtin_models(PathBuf::from(
            "/nonexistent/clearmark/models",
        ));
        reg.discover().expect("discover");
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("blob.bin");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            sha256_file(&path).expect("hash"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
