//! Bucket stored in a local directory
//!
//! Every object is a regular file below the bucket root; its ACL is stored as
//! the file's permission bits. Directories exist only as common prefixes.

use super::{Acl, Acls, Listing, ObjectInfo, ObjectStore};
use crate::core::error::{MfsError, Result};
use crate::core::stats::{Metric, MetricKind, MetricsProvider};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SIZE_QUANTILES: [f64; 5] = [0.5, 0.9, 0.95, 0.99, 1.0];

/// Check that `key` is an absolute path without empty or `..` elements
///
/// A single trailing slash is allowed (it names a prefix).
pub fn validate_key(key: &str) -> Result<()> {
    if key == "/" {
        return Ok(());
    }
    let Some(rest) = key.strip_prefix('/') else {
        return Err(MfsError::InvalidPath(format!(
            "'{}' must start with slash (/)",
            key
        )));
    };

    let rest = rest.strip_suffix('/').unwrap_or(rest);
    for element in rest.split('/') {
        if element.is_empty() || element == "." || element == ".." {
            return Err(MfsError::InvalidPath(format!(
                "'{}' contains an invalid path element",
                key
            )));
        }
    }
    Ok(())
}

/// Content type guessed from the file extension
pub fn guess_mime(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let mime = match extension.as_str() {
        "txt" | "log" => mime::TEXT_PLAIN,
        "html" | "htm" => mime::TEXT_HTML,
        "css" => mime::TEXT_CSS,
        "csv" => mime::TEXT_CSV,
        "js" => mime::TEXT_JAVASCRIPT,
        "xml" => mime::TEXT_XML,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        _ => mime::APPLICATION_OCTET_STREAM,
    };
    mime.to_string()
}

/// Directory-backed object store
pub struct LocalBucket {
    root: PathBuf,
    acls: Acls,
}

impl LocalBucket {
    /// Open (and create if needed) a bucket rooted at `root`
    pub fn open(acls: Acls, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("Opened local bucket at {}", root.display());
        Ok(LocalBucket { root, acls })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a validated key
    pub fn to_disk_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key.trim_start_matches('/')))
    }

    fn acl_for_put(&self, acl: Option<&str>) -> Result<&Acl> {
        match acl {
            Some(name) => self
                .acls
                .by_name(name)
                .ok_or_else(|| MfsError::InvalidAcl(name.to_string())),
            None => self
                .acls
                .default_acl()
                .ok_or_else(|| MfsError::Configuration("no default ACL defined".into())),
        }
    }

    fn collect(&self, prefix: &str, common_prefixes: bool, listing: &mut Listing) -> Result<()> {
        // Split "/dir/name-prefix" into the directory to read and the name filter
        let split = prefix.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (dir_key, name_prefix) = prefix.split_at(split);
        let dir = self.root.join(dir_key.trim_start_matches('/'));

        if !dir.is_dir() {
            return Ok(());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!("Skipping non UTF-8 name in {}", dir.display());
                continue;
            };
            if name.starts_with(name_prefix) {
                entries.push((name, entry.file_type()?.is_dir()));
            }
        }
        entries.sort();

        for (name, is_dir) in entries {
            let key = format!("{}{}", dir_key, name);
            if is_dir {
                let sub_prefix = format!("{}/", key);
                if common_prefixes {
                    listing.common_prefixes.push(sub_prefix);
                } else {
                    self.collect(&sub_prefix, false, listing)?;
                }
            } else if let Some(info) = self.object_info(&key)? {
                listing.objects.push(info);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalBucket {
    fn acls(&self) -> &Acls {
        &self.acls
    }

    fn object_info(&self, key: &str) -> Result<Option<ObjectInfo>> {
        if key.ends_with('/') {
            validate_key(key)?;
            return Ok(None);
        }
        let path = self.to_disk_path(key)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mtime: DateTime<Utc> = metadata.modified()?.into();
        Ok(Some(ObjectInfo {
            key: key.to_string(),
            size: metadata.len(),
            acl: self
                .acls
                .by_mode(metadata.permissions().mode())
                .map(|acl| acl.name.clone()),
            mime: guess_mime(&path),
            mtime: mtime.to_rfc3339_opts(SecondsFormat::Secs, false),
        }))
    }

    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.to_disk_path(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn put_object(&self, key: &str, data: &[u8], acl: Option<&str>) -> Result<()> {
        if key.ends_with('/') {
            return Err(MfsError::InvalidPath(format!(
                "'{}' names a prefix, not an object",
                key
            )));
        }
        let acl = self.acl_for_put(acl)?;
        let path = self.to_disk_path(key)?;
        if path.is_dir() {
            return Err(MfsError::PrefixConflict(key.to_string()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(acl.mode))?;

        debug!("Stored {} ({} bytes, acl {})", key, data.len(), acl.name);
        Ok(())
    }

    fn delete_object(&self, key: &str) -> Result<bool> {
        let path = self.to_disk_path(key)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!("Deleted {}", key);
        Ok(true)
    }

    fn list_objects(&self, prefix: &str, common_prefixes: bool) -> Result<Listing> {
        validate_key(prefix)?;
        let mut listing = Listing::default();
        self.collect(prefix, common_prefixes, &mut listing)?;
        Ok(listing)
    }

    fn update_object_acl(&self, key: &str, acl: &str) -> Result<()> {
        let acl = self
            .acls
            .by_name(acl)
            .ok_or_else(|| MfsError::InvalidAcl(acl.to_string()))?;
        let path = self.to_disk_path(key)?;
        if !path.is_file() {
            return Err(MfsError::NoSuchKey(key.to_string()));
        }

        fs::set_permissions(&path, fs::Permissions::from_mode(acl.mode))?;
        debug!("Changed acl of {} to {}", key, acl.name);
        Ok(())
    }
}

impl MetricsProvider for LocalBucket {
    fn metrics(&self) -> Vec<Metric> {
        let mut sizes: Vec<u64> = match self.list_objects("/", false) {
            Ok(listing) => listing.objects.iter().map(|object| object.size).collect(),
            Err(e) => {
                warn!("Failed to list bucket for metrics: {}", e);
                Vec::new()
            }
        };
        sizes.sort_unstable();

        let name = "bucket_object_size_bytes";
        let mut metrics = Vec::new();
        if !sizes.is_empty() {
            for quantile in SIZE_QUANTILES {
                let index = ((sizes.len() as f64 * quantile) as usize).min(sizes.len() - 1);
                metrics.push(
                    Metric::new(name, sizes[index] as f64)
                        .with_help("Size of stored objects")
                        .with_kind(MetricKind::Summary)
                        .with_tag("quantile", quantile.to_string()),
                );
            }
        }
        metrics.push(Metric::new(format!("{}_count", name), sizes.len() as f64));
        metrics.push(Metric::new(
            format!("{}_sum", name),
            sizes.iter().sum::<u64>() as f64,
        ));
        metrics
    }
}
