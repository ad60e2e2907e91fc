use log::info;

use crate::common::MetadataLookup;
use crate::error::{BootstrapError, Result};

/// A property value of this form defers resolution to live instance
/// metadata instead of using the literal string.
pub const METADATA_DIRECTIVE_PREFIX: &str = "ec2-metadata.";

/// Placeholder table parsed from the bundle property file. Keys are
/// case-sensitive and keep their file order; substitution later walks
/// them in exactly this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    entries: Vec<(String, String)>,
}

impl PropertyMapping {
    /// Parse one section of an INI-like property file. Lines outside
    /// the named section, blank lines and `#`/`;` comments are ignored.
    pub fn from_ini_section(content: &str, section: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut in_section = false;
        let mut section_seen = false;
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = header.trim() == section;
                section_seen |= in_section;
                continue;
            }
            if !in_section {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(':'))
                .ok_or_else(|| {
                    BootstrapError::config(format!(
                        "property file line {}: expected key = value, got {raw:?}",
                        lineno + 1
                    ))
                })?;
            entries.push((key.trim().to_string(), value.trim().to_string()));
        }
        if !section_seen {
            return Err(BootstrapError::config(format!(
                "property file has no [{section}] section"
            )));
        }
        Ok(Self { entries })
    }

    /// Replace every `ec2-metadata.<attribute>` directive with its live
    /// value. An absent or empty attribute fails the whole bootstrap,
    /// naming the offending key.
    pub fn resolve(self, metadata: &dyn MetadataLookup) -> Result<ResolvedMapping> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            let directive = value.strip_prefix(METADATA_DIRECTIVE_PREFIX).map(str::to_owned);
            let value = match directive {
                Some(attribute) if attribute.is_empty() => {
                    return Err(BootstrapError::Resolution {
                        key,
                        reason: "directive names no metadata attribute".to_string(),
                    });
                }
                Some(attribute) => {
                    let live = metadata.lookup(&attribute).map_err(|e| {
                        BootstrapError::Resolution {
                            key: key.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    if live.is_empty() {
                        return Err(BootstrapError::Resolution {
                            key,
                            reason: format!("instance metadata attribute {attribute} is empty"),
                        });
                    }
                    info!("Resolved {key} from instance metadata attribute {attribute}");
                    live
                }
                None => value,
            };
            entries.push((key, value));
        }
        Ok(ResolvedMapping { entries })
    }
}

/// The fully concretized placeholder table; no entry is still a
/// directive once this exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    entries: Vec<(String, String)>,
}

impl ResolvedMapping {
    pub fn from_pairs(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}
