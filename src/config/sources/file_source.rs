//! Generic async file-based config source with SHA-256 change detection.
//!
//! [`FileSource`] implements [`ConfigSource`] for any file format by
//! accepting a deserialization function at construction time. Every
//! load re-reads the file, validates the parsed config, and tags it with
//! the hash of the raw bytes so the reload loop can skip unchanged files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::GrayrouteError;

type Deserialize = fn(&str) -> Result<Config, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserialize,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserialize) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    #[cfg(feature = "yaml")]
    #[must_use]
    pub fn yaml(path: PathBuf) -> Self {
        Self::new(path, "yaml", |content| {
            serde_yml::from_str::<Config>(content).map_err(Into::into)
        })
    }

    #[cfg(feature = "json")]
    #[must_use]
    pub fn json(path: PathBuf) -> Self {
        Self::new(path, "json", |content| {
            serde_json::from_str::<Config>(content).map_err(Into::into)
        })
    }

    #[cfg(feature = "toml")]
    #[must_use]
    pub fn toml(path: PathBuf) -> Self {
        Self::new(path, "toml", |content| {
            toml::from_str::<Config>(content).map_err(Into::into)
        })
    }

    /// Pick the format from the file extension.
    pub fn for_path(path: &Path) -> Result<Self, GrayrouteError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(Self::yaml(path.to_path_buf())),

            #[cfg(feature = "json")]
            "json" => Ok(Self::json(path.to_path_buf())),

            #[cfg(feature = "toml")]
            "toml" => Ok(Self::toml(path.to_path_buf())),

            other => Err(GrayrouteError::UnsupportedFormat(other.to_string())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, GrayrouteError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => GrayrouteError::ConfigFileNotFound {
                    path: self.path.clone(),
                },
                _ => GrayrouteError::Io(e),
            })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), GrayrouteError> {
        let content = self.read_content().await?;

        let config = (self.deserialize)(&content).map_err(|source| GrayrouteError::ConfigParse {
            path: self.path.display().to_string(),
            source,
        })?;

        validate(&config).map_err(|errors| GrayrouteError::ConfigValidation { errors })?;

        tracing::debug!(
            path = %self.path.display(),
            routes = config.routes.len(),
            services = config.services.len(),
            "config file parsed"
        );

        Ok((config, ConfigVersion::Hash(sha256_hex(content.as_bytes()))))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, GrayrouteError> {
        let content = self.read_content().await?;
        Ok(*current != ConfigVersion::Hash(sha256_hex(content.as_bytes())))
    }
}

#[cfg(all(test, feature = "yaml"))]
mod tests {
    use super::*;

    const CONFIG: &str = "\
routing:
  prod_version: v1
  gray_version: v2
routes:
  - path: /user/*
    service: user
services:
  user:
    - id: u1
      url: http://127.0.0.1:9001
      metadata:
        version: v1
";

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("grayroute-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn load_then_detect_change() {
        let path = scratch_path("change.yaml");
        tokio::fs::write(&path, CONFIG).await.unwrap();

        let source = FileSource::yaml(path.clone());
        let (config, version) = source.load().await.unwrap();
        assert_eq!(config.routes.len(), 1);
        assert!(!source.has_changed(&version).await.unwrap());

        tokio::fs::write(&path, CONFIG.replace("gray_version: v2", "gray_version: v3"))
            .await
            .unwrap();
        assert!(source.has_changed(&version).await.unwrap());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_file_is_reported_with_its_path() {
        let path = scratch_path("missing.yaml");
        let source = FileSource::yaml(path.clone());
        match source.load().await {
            Err(GrayrouteError::ConfigFileNotFound { path: reported }) => assert_eq!(reported, path),
            other => panic!("expected ConfigFileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn extension_selects_the_format() {
        let source = FileSource::for_path(Path::new("conf/grayroute.yml")).unwrap();
        assert_eq!(source.name(), "yaml");
        assert!(matches!(
            FileSource::for_path(Path::new("grayroute.conf")),
            Err(GrayrouteError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_on_load() {
        let path = scratch_path("invalid.yaml");
        tokio::fs::write(&path, CONFIG.replace("gray_version: v2", "gray_version: v1"))
            .await
            .unwrap();

        let source = FileSource::yaml(path.clone());
        assert!(matches!(
            source.load().await,
            Err(GrayrouteError::ConfigValidation { .. })
        ));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
