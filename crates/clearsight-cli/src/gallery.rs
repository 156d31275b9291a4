use anyhow::{bail, Context, Result};
use clearsight_core::Identity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Enrolled identities, persisted as a JSON file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    /// Read the gallery; a missing file is an empty gallery.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading gallery {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing gallery {}", path.display()))
    }

    /// Write the gallery through a temporary file and rename it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn contains(&self, id: &str) -> bool {
        self.identities.iter().any(|i| i.id == id)
    }

    /// Append an identity; ids are unique.
    pub fn add(&mut self, identity: Identity) -> Result<()> {
        if self.contains(&identity.id) {
            bail!("identity {} is already enrolled", identity.id);
        }
        self.identities.push(identity);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Identity> {
        let pos = self.identities.iter().position(|i| i.id == id)?;
        Some(self.identities.remove(pos))
    }
}
