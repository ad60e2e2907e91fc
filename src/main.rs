mod bundle;
mod common;
mod ec2;
mod error;
mod orchestrator;
mod payload;
mod properties;
mod services;
mod substitute;
mod tags;
mod volume;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use log::{error, info};

use crate::bundle::S3Bundle;
use crate::common::{fetch_user_data, Imds, InstanceIdentity, WORK_DIR};
use crate::ec2::AwsCli;
use crate::error::Result;
use crate::orchestrator::Capabilities;
use crate::payload::InstructionPayload;
use crate::services::Systemd;
use crate::volume::HostMounter;

fn main() -> ExitCode {
    init_logger();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Bootstrap failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let identity = InstanceIdentity::from_host()?;
    info!(
        "Bootstrapping instance {} in {} ({})",
        identity.instance_id, identity.region, identity.availability_zone
    );

    let user_data = fetch_user_data()?;
    let payload = InstructionPayload::parse(&user_data)?;

    let ec2 = AwsCli {
        region: identity.region.clone(),
    };
    let caps = Capabilities {
        metadata: &Imds,
        ec2: &ec2,
        mounter: &HostMounter,
        bundles: &S3Bundle,
        services: &Systemd,
    };
    orchestrator::run(&payload, &identity, &caps, Path::new(WORK_DIR))
}

fn init_logger() {
    env_logger::Builder::new()
        .format(|buf, record| {
            let timestamp = chrono::Local::now().format("%b %d %H:%M:%S").to_string();
            let process_name = std::env::current_exe()
                .ok()
                .and_then(|path| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| "ami-bootstrap".to_string());
            let pid = std::process::id();
            writeln!(
                buf,
                "{} {}[{}]: {} {}",
                timestamp,
                process_name,
                pid,
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Debug)
        .init();
}
