// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The on-disk config store: `candidate/` and `active/` directories of per-tenant YAML (§4.1,
//! §6 file layout).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{ConfigError, ConfigResult};
use crate::ids::TenantId;
use crate::model::{ServiceConfig, Tenant};
use crate::snapshot::{Snapshot, SnapshotDiff};
use crate::validate::validate;

/// The result of a `commit` call (§4.1).
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The structured diff between the pre- and post-commit snapshot.
    pub diff: SnapshotDiff,
    /// `true` if this was a dry run: the diff is reported but nothing was written.
    pub dry_run: bool,
}

/// A filesystem-backed config store rooted at a base directory containing `candidate/` and
/// `active/` subdirectories, one YAML file per tenant plus `DEFAULT.yaml`.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open a store rooted at `root`, which must contain (or be creatable to contain)
    /// `candidate/` and `active/` subdirectories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the subdirectories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> ConfigResult<Self> {
        let root = root.into();
        for sub in ["candidate", "active"] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| ConfigError::io(dir.display().to_string(), e))?;
        }
        Ok(Store { root })
    }

    fn dir(&self, which: Which) -> PathBuf {
        self.root.join(which.as_str())
    }

    fn tenant_file(&self, which: Which, tenant: &TenantId) -> PathBuf {
        self.dir(which).join(format!("{tenant}.yaml"))
    }

    /// Parse every YAML file under `active/` into a validated [`Snapshot`] (§4.1).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseFailure`] on malformed YAML, [`ConfigError::InvalidConfig`]
    /// (via [`validate`]) on a structurally valid but semantically illegal configuration, and
    /// [`ConfigError::StoreCorrupt`] if `active/` cannot be listed at all (the only config error
    /// that escalates to process exit, per §7).
    pub fn load_active(&self) -> ConfigResult<Snapshot> {
        self.load(Which::Active, 0)
    }

    fn load(&self, which: Which, generation: u64) -> ConfigResult<Snapshot> {
        let dir = self.dir(which);
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| ConfigError::StoreCorrupt(format!("{}: {e}", dir.display())))?;

        let mut service = None;
        let mut tenants = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::io(dir.display().to_string(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::io(path.display().to_string(), e))?;

            if stem == "DEFAULT" {
                let parsed: TenantFile = serde_yaml_ng::from_str(&contents).map_err(|e| {
                    ConfigError::ParseFailure {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                service = Some(parsed.service.ok_or_else(|| {
                    ConfigError::invalid(path.display().to_string(), "DEFAULT.yaml must carry service config")
                })?);
                tenants.insert(parsed.tenant.id.clone(), parsed.tenant);
            } else {
                let tenant: Tenant = serde_yaml_ng::from_str(&contents).map_err(|e| {
                    ConfigError::ParseFailure {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let expected = TenantId::try_from(stem)?;
                if tenant.id != expected {
                    return Err(ConfigError::TenantIdMismatch {
                        file: path.display().to_string(),
                        declared: tenant.id.to_string(),
                        expected: expected.to_string(),
                    });
                }
                tenants.insert(tenant.id.clone(), tenant);
            }
        }

        let service = service.ok_or_else(|| {
            ConfigError::invalid(dir.join("DEFAULT.yaml").display().to_string(), "missing DEFAULT.yaml")
        })?;

        let snapshot = Snapshot {
            generation,
            service,
            tenants,
        };
        validate(&snapshot)?;
        Ok(snapshot)
    }

    /// Write (create or overwrite) a non-`DEFAULT` tenant's candidate file.
    ///
    /// Full validation happens at `commit` time, not here, since a candidate edit is by
    /// definition a staged, not-yet-applied change; §4.1 only requires that the *resulting
    /// combined snapshot* validate before a commit is allowed to land.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] if `tenant.id` is `DEFAULT` (use
    /// [`Store::edit_service`] instead), or [`ConfigError::Io`] on a write failure.
    pub fn edit(&self, tenant: &Tenant) -> ConfigResult<()> {
        self.write_tenant(Which::Candidate, tenant)
    }

    /// Write (create or overwrite) the `DEFAULT` tenant's candidate file, which carries both the
    /// tenant envelope (EXTERNAL/CORE/ENDPOINT NIs) and the flattened service config (§3, §6).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] on a write failure.
    pub fn edit_service(&self, tenant: &Tenant, service: &ServiceConfig) -> ConfigResult<()> {
        let path = self.tenant_file(Which::Candidate, &tenant.id);
        let file = TenantFile {
            tenant: tenant.clone(),
            service: Some(service.clone()),
        };
        let yaml = serde_yaml_ng::to_string(&file)
            .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))?;
        atomic_write(&path, &yaml)
    }

    /// Remove a tenant's candidate file (a `delete` operation staged for the next commit).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] on a filesystem failure other than "not found".
    pub fn delete_candidate(&self, tenant: &TenantId) -> ConfigResult<()> {
        let path = self.tenant_file(Which::Candidate, tenant);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::io(path.display().to_string(), e)),
        }
    }

    fn write_tenant(&self, which: Which, tenant: &Tenant) -> ConfigResult<()> {
        let path = self.tenant_file(which, tenant);
        let yaml = if tenant.id == TenantId::default_tenant() {
            return Err(ConfigError::invalid(
                path.display().to_string(),
                "use commit_service to write DEFAULT.yaml",
            ));
        } else {
            serde_yaml_ng::to_string(tenant)
                .map_err(|e| ConfigError::invalid(path.display().to_string(), e.to_string()))?
        };
        atomic_write(&path, &yaml)
    }

    /// Atomically replace `active/<tenant>.yaml` with the candidate (§4.1), after validating the
    /// resulting combined snapshot. `--revert` performs the mirror operation: replace the
    /// candidate with the active file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoSuchCandidate`]/[`ConfigError::NoSuchActive`] if the source file
    /// is missing, and [`ConfigError::InvalidConfig`] if the resulting snapshot fails validation
    /// — in which case `active/` is left byte-identical (§8 law 3).
    pub fn commit(&self, tenant: &TenantId, opts: CommitOptions) -> ConfigResult<CommitOutcome> {
        let before = self.load(Which::Active, 0)?;

        let (src, dst) = if opts.revert {
            (Which::Active, Which::Candidate)
        } else {
            (Which::Candidate, Which::Active)
        };

        let src_path = self.tenant_file(src, tenant);
        if !src_path.exists() {
            return Err(if opts.revert {
                ConfigError::NoSuchActive(tenant.to_string())
            } else {
                ConfigError::NoSuchCandidate(tenant.to_string())
            });
        }
        let src_contents = std::fs::read_to_string(&src_path)
            .map_err(|e| ConfigError::io(src_path.display().to_string(), e))?;

        // Build the prospective post-commit snapshot in memory without touching disk.
        let mut prospective = before.clone();
        prospective.generation += 1;
        if dst == Which::Active {
            if *tenant == TenantId::default_tenant() {
                let parsed: TenantFile = serde_yaml_ng::from_str(&src_contents).map_err(|e| {
                    ConfigError::ParseFailure {
                        path: src_path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let service = parsed.service.ok_or_else(|| {
                    ConfigError::invalid(src_path.display().to_string(), "DEFAULT.yaml must carry service config")
                })?;
                prospective.service = service;
                prospective.tenants.insert(tenant.clone(), parsed.tenant);
            } else {
                let tenant_parsed: Tenant = serde_yaml_ng::from_str(&src_contents).map_err(|e| {
                    ConfigError::ParseFailure {
                        path: src_path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                prospective.tenants.insert(tenant.clone(), tenant_parsed);
            }
        }
        validate(&prospective)?;

        let diff = SnapshotDiff::compute(&before, &prospective);

        if opts.dry_run {
            return Ok(CommitOutcome { diff, dry_run: true });
        }

        let dst_path = self.tenant_file(dst, tenant);
        atomic_write(&dst_path, &src_contents)?;
        info!("committed {tenant} ({src:?} -> {dst:?})");
        Ok(CommitOutcome { diff, dry_run: false })
    }
}

/// Options controlling [`Store::commit`] (§6 CLI surface: `commit [--dry-run] [--diff] [--revert]`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Validate and compute the diff, but don't write anything.
    pub dry_run: bool,
    /// Reverse direction: replace the candidate with the active file instead.
    pub revert: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Which {
    Candidate,
    Active,
}

impl Which {
    const fn as_str(self) -> &'static str {
        match self {
            Which::Candidate => "candidate",
            Which::Active => "active",
        }
    }
}

/// `DEFAULT.yaml`'s shape: the tenant envelope plus the flattened service config.
#[derive(serde::Serialize, serde::Deserialize)]
struct TenantFile {
    #[serde(flatten)]
    tenant: Tenant,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    service: Option<ServiceConfig>,
}

/// Write `contents` to `path` by writing a temp file in the same directory and renaming it into
/// place, so that partial writes are never visible to a concurrent reader (§4.1).
fn atomic_write(path: &Path, contents: &str) -> ConfigResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".vpnc-tmp-")
        .tempfile_in(dir)
        .map_err(|e| ConfigError::io(dir.display().to_string(), e))?;
    use std::io::Write;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| ConfigError::io(path.display().to_string(), e))?;
    tmp.flush().map_err(|e| ConfigError::io(path.display().to_string(), e))?;
    tmp.persist(path)
        .map_err(|e| ConfigError::io(path.display().to_string(), e.error))?;
    debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NetworkInstanceId;
    use crate::model::{AllocatorPrefixes, BgpGlobals, Mode, NetworkInstance, NiType};
    use std::collections::BTreeMap;

    fn default_tenant_file(svc: ServiceConfig) -> TenantFile {
        let mut ni = BTreeMap::new();
        ni.insert(
            NetworkInstanceId::try_from(NetworkInstanceId::EXTERNAL).unwrap(),
            NetworkInstance {
                ni_type: NiType::External,
                metadata: Default::default(),
                connections: Default::default(),
            },
        );
        ni.insert(
            NetworkInstanceId::try_from(NetworkInstanceId::CORE).unwrap(),
            NetworkInstance {
                ni_type: NiType::Core,
                metadata: Default::default(),
                connections: Default::default(),
            },
        );
        TenantFile {
            tenant: Tenant {
                id: TenantId::default_tenant(),
                name: "default".to_string(),
                metadata: Default::default(),
                network_instances: ni,
            },
            service: Some(svc),
        }
    }

    fn svc() -> ServiceConfig {
        ServiceConfig {
            mode: Mode::Hub,
            prefixes: AllocatorPrefixes {
                prefix_downlink_interface_v4: "100.64.0.0/16".parse().unwrap(),
                prefix_downlink_interface_v6: "fd00:1::/32".parse().unwrap(),
                prefix_downlink_nat64: "fdcc:0::/32".parse().unwrap(),
                prefix_downlink_nptv6: "fdff::/12".parse().unwrap(),
            },
            bgp: BgpGlobals {
                asn: 4_200_000_001,
                router_id: std::net::Ipv4Addr::new(10, 0, 0, 1),
                bfd: false,
                neighbors: vec![],
            },
        }
    }

    #[test]
    fn load_active_round_trips_default_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let yaml = serde_yaml_ng::to_string(&default_tenant_file(svc())).unwrap();
        std::fs::write(dir.path().join("active/DEFAULT.yaml"), yaml).unwrap();

        let snapshot = store.load_active().unwrap();
        assert_eq!(snapshot.service.mode, Mode::Hub);
        assert!(snapshot.tenants.contains_key(&TenantId::default_tenant()));
    }

    #[test]
    fn commit_with_validation_failure_leaves_active_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let yaml = serde_yaml_ng::to_string(&default_tenant_file(svc())).unwrap();
        std::fs::write(dir.path().join("active/DEFAULT.yaml"), &yaml).unwrap();

        // stage an illegal candidate: a C#### tenant with no network instances is legal on its
        // own, but let's make it actually illegal by duplicating the EXTERNAL NI type assignment
        // via an endpoint NI while in hub mode.
        let c0001 = TenantId::try_from("C0001").unwrap();
        let mut bad = Tenant {
            id: c0001.clone(),
            name: "bad".to_string(),
            metadata: Default::default(),
            network_instances: Default::default(),
        };
        bad.network_instances.insert(
            NetworkInstanceId::try_from(NetworkInstanceId::ENDPOINT).unwrap(),
            NetworkInstance {
                ni_type: NiType::Endpoint,
                metadata: Default::default(),
                connections: Default::default(),
            },
        );
        std::fs::write(
            dir.path().join("candidate/C0001.yaml"),
            serde_yaml_ng::to_string(&bad).unwrap(),
        )
        .unwrap();

        let before = std::fs::read(dir.path().join("active/DEFAULT.yaml")).unwrap();
        let result = store.commit(&c0001, CommitOptions::default());
        assert!(result.is_err());
        let after = std::fs::read(dir.path().join("active/DEFAULT.yaml")).unwrap();
        assert_eq!(before, after);
        assert!(!dir.path().join("active/C0001.yaml").exists());
    }

    #[test]
    fn commit_then_revert_is_a_no_op_at_the_active_level() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let yaml = serde_yaml_ng::to_string(&default_tenant_file(svc())).unwrap();
        std::fs::write(dir.path().join("active/DEFAULT.yaml"), &yaml).unwrap();

        let c0001 = TenantId::try_from("C0001").unwrap();
        let tenant = Tenant {
            id: c0001.clone(),
            name: "acme".to_string(),
            metadata: Default::default(),
            network_instances: Default::default(),
        };
        std::fs::write(
            dir.path().join("candidate/C0001.yaml"),
            serde_yaml_ng::to_string(&tenant).unwrap(),
        )
        .unwrap();

        store.commit(&c0001, CommitOptions::default()).unwrap();
        let after_commit = std::fs::read(dir.path().join("active/C0001.yaml")).unwrap();

        store
            .commit(&c0001, CommitOptions { revert: true, ..Default::default() })
            .unwrap();
        // the revert direction moves active -> candidate; commit again to re-apply.
        store.commit(&c0001, CommitOptions::default()).unwrap();
        let after_roundtrip = std::fs::read(dir.path().join("active/C0001.yaml")).unwrap();
        assert_eq!(after_commit, after_roundtrip);
    }
}
