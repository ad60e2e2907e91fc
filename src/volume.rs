use std::io;
use std::thread;
use std::time::Duration;

use cmd_lib::*;
use log::{info, warn};
use serde::Deserialize;

use crate::common::InstanceIdentity;
use crate::ec2::Ec2Api;
use crate::error::{BootstrapError, Result};

/// The attach completes asynchronously at the OS level, so the mount is
/// retried on a fixed delay rather than failing on the first attempt.
pub const MOUNT_ATTEMPTS: u32 = 5;
pub const MOUNT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Grace period before the delete-on-terminate attribute update; the
/// update can race the attach completing cloud-side.
const DELETE_ON_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// `app_vol` section of the instruction payload. The first four fields
/// are required together; `vol_size` is in GiB.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeSpec {
    #[serde(default)]
    pub dev_name: Option<String>,
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub vol_size: Option<u32>,
    /// Boolean-like string; anything but true/yes/1 means false.
    #[serde(default)]
    pub delete_on_terminate: Option<String>,
}

/// Validated form of `VolumeSpec`.
#[derive(Debug)]
struct VolumePlan<'a> {
    dev_name: &'a str,
    mount_point: &'a str,
    snapshot_id: &'a str,
    vol_size: u32,
    delete_on_terminate: bool,
}

impl VolumeSpec {
    fn validate(&self) -> Result<VolumePlan<'_>> {
        let required = |field: &str, value: &Option<String>| -> Result<()> {
            match value.as_deref() {
                Some(v) if !v.trim().is_empty() => Ok(()),
                _ => Err(BootstrapError::config(format!(
                    "app_vol.{field} is required"
                ))),
            }
        };
        required("dev_name", &self.dev_name)?;
        required("mount_point", &self.mount_point)?;
        required("snapshot_id", &self.snapshot_id)?;
        let vol_size = self
            .vol_size
            .ok_or_else(|| BootstrapError::config("app_vol.vol_size is required"))?;
        if vol_size == 0 {
            return Err(BootstrapError::config(
                "app_vol.vol_size must be a positive integer",
            ));
        }
        Ok(VolumePlan {
            dev_name: self.dev_name.as_deref().unwrap_or_default(),
            mount_point: self.mount_point.as_deref().unwrap_or_default(),
            snapshot_id: self.snapshot_id.as_deref().unwrap_or_default(),
            vol_size,
            delete_on_terminate: self.delete_on_terminate(),
        })
    }

    pub fn delete_on_terminate(&self) -> bool {
        matches!(
            self.delete_on_terminate
                .as_deref()
                .map(str::to_ascii_lowercase)
                .as_deref(),
            Some("true") | Some("yes") | Some("1")
        )
    }
}

/// OS-level mount of an attached device.
pub trait Mounter {
    fn mount(&self, dev_name: &str, mount_point: &str) -> io::Result<()>;
}

pub struct HostMounter;

impl Mounter for HostMounter {
    fn mount(&self, dev_name: &str, mount_point: &str) -> io::Result<()> {
        run_cmd! {
            mkdir -p $mount_point;
            mount $dev_name $mount_point;
        }
    }
}

pub struct VolumeProvisioner<'a> {
    ec2: &'a dyn Ec2Api,
    mounter: &'a dyn Mounter,
    retry_delay: Duration,
    grace_delay: Duration,
}

impl<'a> VolumeProvisioner<'a> {
    pub fn new(ec2: &'a dyn Ec2Api, mounter: &'a dyn Mounter) -> Self {
        Self {
            ec2,
            mounter,
            retry_delay: MOUNT_RETRY_DELAY,
            grace_delay: DELETE_ON_TERMINATE_GRACE,
        }
    }

    /// Create the application volume from its snapshot, attach it and
    /// mount it. Returns the created volume id. A mount that never
    /// succeeds is terminal; the created volume is not rolled back.
    pub fn provision(&self, spec: &VolumeSpec, identity: &InstanceIdentity) -> Result<String> {
        let plan = spec.validate()?;

        let volume_id = self.ec2.create_volume(
            plan.snapshot_id,
            plan.vol_size,
            &identity.availability_zone,
        )?;
        info!(
            "Created volume {volume_id} ({} GiB) from snapshot {}",
            plan.vol_size, plan.snapshot_id
        );

        self.ec2
            .attach_volume(&volume_id, &identity.instance_id, plan.dev_name)?;

        self.mount_with_retry(plan.dev_name, plan.mount_point)?;

        if plan.delete_on_terminate {
            // Known-fragile step carried over from the original system:
            // the attribute update can still land before the attach has
            // settled cloud-side. Wait out a grace period and keep the
            // bootstrap going if the update fails.
            thread::sleep(self.grace_delay);
            if let Err(e) = self
                .ec2
                .set_delete_on_terminate(&identity.instance_id, plan.dev_name)
            {
                warn!("Could not set delete-on-terminate for {volume_id}: {e}");
            }
        }

        Ok(volume_id)
    }

    fn mount_with_retry(&self, dev_name: &str, mount_point: &str) -> Result<()> {
        let mut last_err = io::Error::other("mount never attempted");
        for attempt in 1..=MOUNT_ATTEMPTS {
            thread::sleep(self.retry_delay);
            match self.mounter.mount(dev_name, mount_point) {
                Ok(()) => {
                    info!("Mounted {dev_name} at {mount_point} (attempt {attempt})");
                    return Ok(());
                }
                Err(e) => {
                    info!("Mount attempt {attempt}/{MOUNT_ATTEMPTS} for {mount_point} failed: {e}");
                    last_err = e;
                }
            }
        }
        Err(BootstrapError::external(
            format!("mounting {dev_name} at {mount_point} after {MOUNT_ATTEMPTS} attempts"),
            last_err,
        ))
    }
}
