use cmd_lib::*;

use crate::error::{BootstrapError, Result};

/// The EC2 control-plane calls the bootstrap needs, kept opaque so the
/// provisioning and tagging logic can run against fakes.
pub trait Ec2Api {
    /// Create a volume from a snapshot in the given zone; returns the
    /// new volume id.
    fn create_volume(&self, snapshot_id: &str, size_gib: u32, availability_zone: &str)
        -> Result<String>;

    fn attach_volume(&self, volume_id: &str, instance_id: &str, dev_name: &str) -> Result<()>;

    /// Mark the device mapping to auto-delete the volume on instance
    /// termination.
    fn set_delete_on_terminate(&self, instance_id: &str, dev_name: &str) -> Result<()>;

    fn create_tags(&self, resource_ids: &[String], tags: &[(String, String)]) -> Result<()>;

    /// Ids of all volumes currently attached to the instance.
    fn attached_volume_ids(&self, instance_id: &str) -> Result<Vec<String>>;
}

/// aws CLI-backed implementation.
pub struct AwsCli {
    pub region: String,
}

impl Ec2Api for AwsCli {
    fn create_volume(
        &self,
        snapshot_id: &str,
        size_gib: u32,
        availability_zone: &str,
    ) -> Result<String> {
        let region = &self.region;
        let size = size_gib.to_string();
        let volume_id = run_fun! {
            aws ec2 create-volume --region $region
                --snapshot-id $snapshot_id
                --size $size
                --availability-zone $availability_zone
                --query VolumeId --output text
        }
        .map_err(|e| {
            BootstrapError::external(format!("creating volume from snapshot {snapshot_id}"), e)
        })?;
        Ok(volume_id.trim().to_string())
    }

    fn attach_volume(&self, volume_id: &str, instance_id: &str, dev_name: &str) -> Result<()> {
        let region = &self.region;
        run_cmd! {
            info "Attaching $volume_id to $instance_id at $dev_name";
            aws ec2 attach-volume --region $region
                --volume-id $volume_id
                --instance-id $instance_id
                --device $dev_name
                --output text
        }
        .map_err(|e| {
            BootstrapError::external(format!("attaching volume {volume_id} at {dev_name}"), e)
        })
    }

    fn set_delete_on_terminate(&self, instance_id: &str, dev_name: &str) -> Result<()> {
        let region = &self.region;
        let mappings =
            format!(r#"[{{"DeviceName":"{dev_name}","Ebs":{{"DeleteOnTermination":true}}}}]"#);
        run_cmd! {
            aws ec2 modify-instance-attribute --region $region
                --instance-id $instance_id
                --block-device-mappings $mappings
        }
        .map_err(|e| {
            BootstrapError::external(
                format!("setting delete-on-terminate for {dev_name} on {instance_id}"),
                e,
            )
        })
    }

    fn create_tags(&self, resource_ids: &[String], tags: &[(String, String)]) -> Result<()> {
        let region = &self.region;
        let resources = resource_ids.to_vec();
        let tag_args: Vec<String> = tags
            .iter()
            .map(|(key, value)| format!("Key={key},Value={value}"))
            .collect();
        run_cmd! {
            aws ec2 create-tags --region $region
                --resources $[resources]
                --tags $[tag_args]
        }
        .map_err(|e| BootstrapError::external(format!("tagging {resource_ids:?}"), e))
    }

    fn attached_volume_ids(&self, instance_id: &str) -> Result<Vec<String>> {
        let region = &self.region;
        let filter = format!("Name=attachment.instance-id,Values={instance_id}");
        let output = run_fun! {
            aws ec2 describe-volumes --region $region
                --filters $filter
                --query "Volumes[].VolumeId" --output text
        }
        .map_err(|e| {
            BootstrapError::external(format!("listing volumes attached to {instance_id}"), e)
        })?;
        Ok(output
            .split_whitespace()
            .filter(|id| *id != "None")
            .map(str::to_string)
            .collect())
    }
}
