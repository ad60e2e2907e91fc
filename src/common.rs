use cmd_lib::*;

use crate::error::{BootstrapError, Result};

pub const WORK_DIR: &str = "/tmp";
pub const AMI_PROPERTIES: &str = "bootstrap.properties";
pub const AMI_FILELIST: &str = "bootstrap.filelist";
pub const HOST_CONFIG_SECTION: &str = "host_config";

/// Lookup of a single attribute on the live instance-metadata service.
pub trait MetadataLookup {
    fn lookup(&self, attribute: &str) -> Result<String>;
}

/// IMDSv2-backed metadata lookup.
pub struct Imds;

fn imds_token() -> FunResult {
    run_fun! {
        curl -X PUT "http://169.254.169.254/latest/api/token"
            -H "X-aws-ec2-metadata-token-ttl-seconds: 21600" -s
    }
}

impl MetadataLookup for Imds {
    fn lookup(&self, attribute: &str) -> Result<String> {
        let token = imds_token()
            .map_err(|e| BootstrapError::external("fetching IMDSv2 token", e))?;
        // -f: an absent attribute answers 404; that must surface as an
        // error, not as the error-document body.
        let value = run_fun! {
            curl -s -f -H "X-aws-ec2-metadata-token: $token"
                "http://169.254.169.254/latest/meta-data/$attribute"
        }
        .map_err(|e| {
            BootstrapError::external(format!("reading instance metadata {attribute}"), e)
        })?;
        Ok(value.trim().to_string())
    }
}

/// Fetch the raw instance user data document.
pub fn fetch_user_data() -> Result<String> {
    let token = imds_token()
        .map_err(|e| BootstrapError::external("fetching IMDSv2 token", e))?;
    run_fun! {
        curl -s -f -H "X-aws-ec2-metadata-token: $token"
            "http://169.254.169.254/latest/user-data"
    }
    .map_err(|e| BootstrapError::external("reading instance user data", e))
}

/// Identity of the instance being bootstrapped, read once at startup
/// and passed into each component.
#[derive(Debug, Clone)]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub region: String,
    pub availability_zone: String,
}

impl InstanceIdentity {
    pub fn from_host() -> Result<Self> {
        let instance_id = required(
            "instance id",
            run_fun!(ec2-metadata --instance-id | awk r"{print $2}"),
        )?;
        let region = required(
            "region",
            run_fun!(ec2-metadata --region | awk r"{print $2}"),
        )?;
        let availability_zone = required(
            "availability zone",
            run_fun!(ec2-metadata --availability-zone | awk r"{print $2}"),
        )?;
        Ok(Self {
            instance_id,
            region,
            availability_zone,
        })
    }
}

fn required(field: &'static str, value: std::io::Result<String>) -> Result<String> {
    let value = value.map_err(|e| {
        BootstrapError::external(format!("reading {field} from instance metadata"), e)
    })?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(BootstrapError::config(format!(
            "{field} is not available from instance metadata"
        )));
    }
    Ok(value)
}
