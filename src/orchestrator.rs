use std::fs;
use std::path::Path;

use log::info;

use crate::bundle::{self, BundleStore};
use crate::common::{InstanceIdentity, MetadataLookup, AMI_FILELIST, AMI_PROPERTIES, HOST_CONFIG_SECTION};
use crate::ec2::Ec2Api;
use crate::error::{BootstrapError, Result};
use crate::payload::InstructionPayload;
use crate::properties::PropertyMapping;
use crate::services::{self, ServiceManager};
use crate::substitute;
use crate::tags::ResourceTagger;
use crate::volume::{Mounter, VolumeProvisioner};

/// The external capabilities the bootstrap sequence runs against,
/// constructed once in `main` and passed down.
pub struct Capabilities<'a> {
    pub metadata: &'a dyn MetadataLookup,
    pub ec2: &'a dyn Ec2Api,
    pub mounter: &'a dyn Mounter,
    pub bundles: &'a dyn BundleStore,
    pub services: &'a dyn ServiceManager,
}

/// Run the bootstrap sequence end to end:
/// volume provision (optional) → bundle fetch → explode → resolve →
/// substitute → tag resources (optional) → start services (optional).
///
/// Steps for absent payload sections are skipped. The first failing
/// step aborts the run; nothing is retried here beyond the mount
/// micro-retry inside the volume provisioner, and nothing is rolled
/// back.
pub fn run(
    payload: &InstructionPayload,
    identity: &InstanceIdentity,
    caps: &Capabilities<'_>,
    work_dir: &Path,
) -> Result<()> {
    // Validate the bundle source up front so a broken payload never
    // provisions cloud resources.
    let (bucket, bundle_name) = payload.bundle_source()?;

    if let Some(spec) = &payload.app_vol {
        let volume_id =
            VolumeProvisioner::new(caps.ec2, caps.mounter).provision(spec, identity)?;
        info!("Provisioned application volume {volume_id}");
    }

    let exploded = bundle::retrieve(caps.bundles, bucket, bundle_name, work_dir)?;

    let properties_path = exploded.join(AMI_PROPERTIES);
    let properties = fs::read_to_string(&properties_path).map_err(|e| {
        BootstrapError::external(
            format!("reading property file {}", properties_path.display()),
            e,
        )
    })?;
    let mapping = PropertyMapping::from_ini_section(&properties, HOST_CONFIG_SECTION)?;
    let resolved = mapping.resolve(caps.metadata)?;

    let files = substitute::read_file_list(&exploded.join(AMI_FILELIST))?;
    substitute::apply_to_files(&resolved, &files)?;

    if let Some(tag_spec) = &payload.metadata {
        ResourceTagger::new(caps.ec2).apply(tag_spec, identity)?;
    }

    if let Some(service_list) = &payload.services {
        services::activate(caps.services, service_list)?;
    }

    info!("Bootstrap complete");
    Ok(())
}
