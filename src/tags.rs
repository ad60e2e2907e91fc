use std::collections::HashMap;

use log::info;
use serde::Deserialize;

use crate::common::InstanceIdentity;
use crate::ec2::Ec2Api;
use crate::error::Result;

pub const NAME_TAG: &str = "Name";

/// `metadata` section of the instruction payload: tag-name to tag-value
/// pairs to apply to the instance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagSpec {
    #[serde(default)]
    pub instance: HashMap<String, String>,
}

pub struct ResourceTagger<'a> {
    ec2: &'a dyn Ec2Api,
}

impl<'a> ResourceTagger<'a> {
    pub fn new(ec2: &'a dyn Ec2Api) -> Self {
        Self { ec2 }
    }

    /// Tag the instance, then propagate the (zone-suffixed) `Name` tag
    /// to every volume currently attached to it. Identically named
    /// instances in different zones stay distinguishable because the
    /// zone is appended to `Name` before tagging.
    pub fn apply(&self, spec: &TagSpec, identity: &InstanceIdentity) -> Result<()> {
        if spec.instance.is_empty() {
            return Ok(());
        }

        // HashMap iteration order is not stable; sort so the EC2 call
        // and the audit log are deterministic.
        let mut tags: Vec<(String, String)> = spec
            .instance
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        tags.sort();

        let mut name = None;
        for (key, value) in &mut tags {
            if key == NAME_TAG {
                if !identity.availability_zone.is_empty() {
                    *value = format!("{value} - {}", identity.availability_zone);
                }
                name = Some(value.clone());
            }
        }

        info!("Tagging instance {} with {tags:?}", identity.instance_id);
        self.ec2
            .create_tags(std::slice::from_ref(&identity.instance_id), &tags)?;

        if let Some(name) = name {
            let volumes = self.ec2.attached_volume_ids(&identity.instance_id)?;
            if !volumes.is_empty() {
                info!("Tagging {} attached volume(s) with Name={name}", volumes.len());
                self.ec2
                    .create_tags(&volumes, &[(NAME_TAG.to_string(), name)])?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootstrapError;
    use std::cell::RefCell;

    fn identity(zone: &str) -> InstanceIdentity {
        InstanceIdentity {
            instance_id: "i-0123456789abcdef0".to_string(),
            region: "us-east-1".to_string(),
            availability_zone: zone.to_string(),
        }
    }

    fn spec(pairs: &[(&str, &str)]) -> TagSpec {
        TagSpec {
            instance: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[derive(Default)]
    struct FakeEc2 {
        tag_calls: RefCell<Vec<(Vec<String>, Vec<(String, String)>)>>,
        volumes: Vec<String>,
        fail_tagging: bool,
    }

    impl Ec2Api for FakeEc2 {
        fn create_volume(&self, _: &str, _: u32, _: &str) -> Result<String> {
            unreachable!("tagger does not create volumes")
        }

        fn attach_volume(&self, _: &str, _: &str, _: &str) -> Result<()> {
            unreachable!("tagger does not attach volumes")
        }

        fn set_delete_on_terminate(&self, _: &str, _: &str) -> Result<()> {
            unreachable!("tagger does not modify attachments")
        }

        fn create_tags(&self, resource_ids: &[String], tags: &[(String, String)]) -> Result<()> {
            if self.fail_tagging {
                return Err(BootstrapError::external(
                    "create-tags",
                    std::io::Error::other("denied"),
                ));
            }
            self.tag_calls
                .borrow_mut()
                .push((resource_ids.to_vec(), tags.to_vec()));
            Ok(())
        }

        fn attached_volume_ids(&self, _: &str) -> Result<Vec<String>> {
            Ok(self.volumes.clone())
        }
    }

    #[test]
    fn test_name_tag_gets_zone_suffix_and_propagates_to_volumes() {
        let ec2 = FakeEc2 {
            volumes: vec!["vol-1".to_string(), "vol-2".to_string()],
            ..FakeEc2::default()
        };
        ResourceTagger::new(&ec2)
            .apply(&spec(&[("Name", "X"), ("Role", "db")]), &identity("us-east-1a"))
            .unwrap();

        let calls = ec2.tag_calls.borrow();
        assert_eq!(calls.len(), 2);

        let (resources, tags) = &calls[0];
        assert_eq!(resources, &["i-0123456789abcdef0".to_string()]);
        assert!(tags.contains(&("Name".to_string(), "X - us-east-1a".to_string())));
        assert!(tags.contains(&("Role".to_string(), "db".to_string())));

        let (resources, tags) = &calls[1];
        assert_eq!(resources, &["vol-1".to_string(), "vol-2".to_string()]);
        // Only Name is propagated to volumes, carrying the same value
        // the instance was tagged with.
        assert_eq!(tags, &[("Name".to_string(), "X - us-east-1a".to_string())]);
    }

    #[test]
    fn test_empty_zone_leaves_name_unsuffixed() {
        let ec2 = FakeEc2::default();
        ResourceTagger::new(&ec2)
            .apply(&spec(&[("Name", "X")]), &identity(""))
            .unwrap();
        let calls = ec2.tag_calls.borrow();
        assert_eq!(calls[0].1, [("Name".to_string(), "X".to_string())]);
    }

    #[test]
    fn test_volumes_untouched_without_name_tag() {
        let ec2 = FakeEc2 {
            volumes: vec!["vol-1".to_string()],
            ..FakeEc2::default()
        };
        ResourceTagger::new(&ec2)
            .apply(&spec(&[("Role", "db")]), &identity("us-east-1a"))
            .unwrap();
        assert_eq!(ec2.tag_calls.borrow().len(), 1);
    }

    #[test]
    fn test_empty_tag_spec_makes_no_calls() {
        let ec2 = FakeEc2::default();
        ResourceTagger::new(&ec2)
            .apply(&spec(&[]), &identity("us-east-1a"))
            .unwrap();
        assert!(ec2.tag_calls.borrow().is_empty());
    }

    #[test]
    fn test_tagging_failure_is_fatal() {
        let ec2 = FakeEc2 {
            fail_tagging: true,
            ..FakeEc2::default()
        };
        let err = ResourceTagger::new(&ec2)
            .apply(&spec(&[("Name", "X")]), &identity("us-east-1a"))
            .unwrap_err();
        assert!(matches!(err, BootstrapError::External { .. }));
    }
}
