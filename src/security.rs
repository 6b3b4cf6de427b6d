use crate::config::Settings;
use crate::constants::IMPORT_DIRECTIVE;
use crate::error::{Error, Result};
use indexmap::IndexSet;

/// Allow-list of import targets a legacy template may name.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicy {
    allowed: IndexSet<String>,
}

impl SecurityPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { allowed: allowed.into_iter().map(Into::into).collect() }
    }

    /// Builds the policy from settings; no whitelist means no policy.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings.legacy_import_whitelist.as_ref().map(|allowed| Self { allowed: allowed.clone() })
    }

    pub fn permits(&self, target: &str) -> bool {
        self.allowed.contains(target)
    }

    /// Scans the source text for import lines and rejects the first target
    /// not on the allow-list.
    ///
    /// The scan is purely textual: any line containing the import marker is
    /// checked, wherever the marker appears.
    pub fn check(&self, source: &str) -> Result<()> {
        for target in import_targets(source) {
            if !self.permits(&target) {
                log::error!("Rejected import '{target}' in legacy template");
                return Err(Error::SecurityViolationError { target });
            }
        }
        Ok(())
    }
}

/// Runs the check when a policy is configured.
pub fn enforce(policy: Option<&SecurityPolicy>, source: &str) -> Result<()> {
    match policy {
        Some(policy) => policy.check(source),
        None => Ok(()),
    }
}

fn import_targets(source: &str) -> impl Iterator<Item = String> + '_ {
    source.split('\n').filter(|line| line.contains(IMPORT_DIRECTIVE)).map(|line| {
        line.replace(IMPORT_DIRECTIVE, "").replace(' ', "").trim().to_string()
    })
}
