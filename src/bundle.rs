use std::io;
use std::path::{Path, PathBuf};

use cmd_lib::*;

use crate::common::{AMI_FILELIST, AMI_PROPERTIES};
use crate::error::{BootstrapError, Result};

/// Object-storage access for the bootstrap bundle. Decompression is a
/// capability too so the orchestration can run against fakes.
pub trait BundleStore {
    fn fetch(&self, bucket: &str, bundle: &str, dest: &Path) -> Result<()>;
    fn explode(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// S3-backed bundle store; bundles are zip archives.
pub struct S3Bundle;

impl BundleStore for S3Bundle {
    fn fetch(&self, bucket: &str, bundle: &str, dest: &Path) -> Result<()> {
        let s3_path = format!("s3://{bucket}/{bundle}");
        let dest = dest.display().to_string();
        run_cmd! {
            info "Downloading bootstrap bundle from $s3_path";
            aws s3 cp --no-progress $s3_path $dest;
        }
        .map_err(|e| BootstrapError::external(format!("downloading {s3_path}"), e))
    }

    fn explode(&self, archive: &Path, dest: &Path) -> Result<()> {
        let archive = archive.display().to_string();
        let dest = dest.display().to_string();
        run_cmd! {
            info "Exploding $archive into $dest";
            mkdir -p $dest;
            unzip -o -q $archive -d $dest;
        }
        .map_err(|e| BootstrapError::external(format!("exploding bundle {archive}"), e))
    }
}

/// Fetch the bundle, verify it arrived, and explode it. Returns the
/// exploded directory, guaranteed to contain the property file and the
/// file list.
pub fn retrieve(
    store: &dyn BundleStore,
    bucket: &str,
    bundle: &str,
    work_dir: &Path,
) -> Result<PathBuf> {
    let archive = work_dir.join(bundle);
    store.fetch(bucket, bundle, &archive)?;
    if !archive.is_file() {
        return Err(BootstrapError::external(
            format!("bundle {} was not downloaded", archive.display()),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    let exploded = work_dir.join("bundle");
    store.explode(&archive, &exploded)?;
    if !exploded.is_dir() {
        return Err(BootstrapError::external(
            format!("bundle was not exploded into {}", exploded.display()),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }
    for member in [AMI_PROPERTIES, AMI_FILELIST] {
        if !exploded.join(member).is_file() {
            return Err(BootstrapError::config(format!(
                "bundle is missing required member {member}"
            )));
        }
    }
    Ok(exploded)
}
