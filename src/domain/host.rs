//! Host inventory: sites, racks and devices owned by the surrounding
//! inventory system.
//!
//! The registry only reads these (OSD placement is derived from them). They
//! are seeded from a YAML document at startup; the only mutation the
//! registry performs is a device delete, which cascades into OSDs.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_graphql::SimpleObject;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct Site {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct Rack {
    pub id: u64,
    pub name: String,
    pub site: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub site: u64,
    pub rack: Option<u64>,
}

/// YAML seed describing the host inventory by natural keys.
///
/// ```yaml
/// sites:
///   - { name: DC 1, slug: dc1 }
/// racks:
///   - { name: R01, site: dc1 }
/// devices:
///   - { name: storage-01, site: dc1, rack: R01 }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostSeed {
    pub sites: Vec<SiteSeed>,
    pub racks: Vec<RackSeed>,
    pub devices: Vec<DeviceSeed>,
}

#[derive(Debug, Deserialize)]
pub struct SiteSeed {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct RackSeed {
    pub name: String,
    /// Site slug.
    pub site: String,
}

#[derive(Debug, Deserialize)]
pub struct DeviceSeed {
    pub name: String,
    /// Site slug.
    pub site: String,
    /// Rack name within the device's site.
    #[serde(default)]
    pub rack: Option<String>,
}

impl HostSeed {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve natural keys into id-linked records. Ids are assigned in
    /// document order starting at 1.
    pub fn resolve(&self) -> Result<(Vec<Site>, Vec<Rack>, Vec<Device>)> {
        let mut sites: Vec<Site> = Vec::with_capacity(self.sites.len());
        for seed in &self.sites {
            if sites.iter().any(|s| s.slug == seed.slug) {
                bail!("duplicate site slug '{}'", seed.slug);
            }
            sites.push(Site {
                id: sites.len() as u64 + 1,
                name: seed.name.clone(),
                slug: seed.slug.clone(),
            });
        }

        let site_id = |slug: &str| -> Result<u64> {
            sites
                .iter()
                .find(|s| s.slug == slug)
                .map(|s| s.id)
                .with_context(|| format!("unknown site '{}'", slug))
        };

        let mut racks: Vec<Rack> = Vec::with_capacity(self.racks.len());
        for seed in &self.racks {
            let site = site_id(&seed.site)?;
            if racks.iter().any(|r| r.site == site && r.name == seed.name) {
                bail!("duplicate rack '{}' in site '{}'", seed.name, seed.site);
            }
            racks.push(Rack {
                id: racks.len() as u64 + 1,
                name: seed.name.clone(),
                site,
            });
        }

        let mut devices: Vec<Device> = Vec::with_capacity(self.devices.len());
        for seed in &self.devices {
            let site = site_id(&seed.site)?;
            let rack = match &seed.rack {
                Some(name) => Some(
                    racks
                        .iter()
                        .find(|r| r.site == site && &r.name == name)
                        .map(|r| r.id)
                        .with_context(|| {
                            format!("unknown rack '{}' in site '{}'", name, seed.site)
                        })?,
                ),
                None => None,
            };
            if devices.iter().any(|d| d.name == seed.name) {
                bail!("duplicate device name '{}'", seed.name);
            }
            devices.push(Device {
                id: devices.len() as u64 + 1,
                name: seed.name.clone(),
                site,
                rack,
            });
        }

        Ok((sites, racks, devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
sites:
  - { name: DC 1, slug: dc1 }
  - { name: DC 2, slug: dc2 }
racks:
  - { name: R01, site: dc1 }
  - { name: R01, site: dc2 }
devices:
  - { name: storage-01, site: dc1, rack: R01 }
  - { name: storage-02, site: dc2, rack: R01 }
  - { name: loose-01, site: dc2 }
"#;

    #[test]
    fn resolves_natural_keys() {
        let (sites, racks, devices) = HostSeed::parse(SEED).unwrap().resolve().unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(racks[1].site, 2);
        assert_eq!(devices[0].rack, Some(1));
        assert_eq!(devices[1].rack, Some(2));
        assert_eq!(devices[2].rack, None);
        assert_eq!(devices[2].site, 2);
    }

    #[test]
    fn rejects_unknown_rack() {
        let seed = HostSeed::parse(
            "sites: [{name: A, slug: a}]\ndevices: [{name: d, site: a, rack: nope}]\n",
        )
        .unwrap();
        let err = seed.resolve().unwrap_err();
        assert!(err.to_string().contains("unknown rack 'nope'"));
    }

    #[test]
    fn rejects_duplicate_device() {
        let seed = HostSeed::parse(
            "sites: [{name: A, slug: a}]\ndevices: [{name: d, site: a}, {name: d, site: a}]\n",
        )
        .unwrap();
        assert!(seed.resolve().is_err());
    }
}
