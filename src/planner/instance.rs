//! Instance update planning.
//!
//! Classifies the difference between the stored state and the planned state
//! into ordered buckets. Planning is pure: every refusal surfaces here, before
//! the reconciler issues a single write.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;
use validator::Validate;

use crate::error::{PlanError, Result};
use crate::flatten::{ConfigModel, DeviceModel, DevicesModel, DiskModel, InstanceModel};
use crate::linode::types::{
    BackupsUpdate, ConfigInterface, DeviceSlot, Filesystem, InstanceUpdateRequest, MigrationType,
};

/// Disk allowances of the old and new plan types, in MB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeChange {
    /// Allowance of the current type.
    pub from_disk_mb: u64,
    /// Allowance of the requested type.
    pub to_disk_mb: u64,
}

impl TypeChange {
    /// True when the new plan is at least as large.
    #[must_use]
    pub const fn is_upsize(&self) -> bool {
        self.to_disk_mb >= self.from_disk_mb
    }
}

/// A disk resize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskResize {
    /// Disk id.
    pub disk_id: u64,
    /// Disk label.
    pub label: String,
    /// New size in MB.
    pub size: u64,
}

/// The resize bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeStep {
    /// Target plan type.
    pub plan_type: String,
    /// Migration strategy.
    pub migration_type: MigrationType,
    /// Allowances of both plans.
    pub change: TypeChange,
    /// Growth of the largest implicit disk.
    pub expand: Option<DiskResize>,
}

/// Explicit disk changes, keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskChanges {
    /// Disks to create.
    pub create: Vec<DiskModel>,
    /// Disks to resize.
    pub resize: Vec<DiskResize>,
    /// Disks to delete, as id and label.
    pub delete: Vec<(u64, String)>,
}

impl DiskChanges {
    /// True when no disk changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.resize.is_empty() && self.delete.is_empty()
    }
}

/// Explicit config changes, keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    /// Configs to create.
    pub create: Vec<ConfigModel>,
    /// Configs to update, with their remote id.
    pub update: Vec<(u64, ConfigModel)>,
    /// Configs to delete, as id and label.
    pub delete: Vec<(u64, String)>,
}

impl ConfigChanges {
    /// True when no config changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Additional address changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraIpChanges {
    /// Addresses to allocate, by public flag.
    pub allocate: Vec<bool>,
    /// Addresses to release.
    pub release: Vec<String>,
}

impl ExtraIpChanges {
    /// True when no address changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocate.is_empty() && self.release.is_empty()
    }
}

/// Why the instance restarts at the end of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootReason {
    /// Plan type changed.
    Resize,
    /// Private address allocated.
    PrivateIp,
    /// Boot config switched.
    BootConfig,
    /// Boot config contents changed.
    ConfigChange,
    /// Interfaces changed.
    Interfaces,
    /// Disks changed while offline.
    DiskChange,
}

impl RebootReason {
    /// Reasons `skip_implicit_reboots` suppresses.
    #[must_use]
    pub const fn is_implicit(self) -> bool {
        matches!(self, Self::ConfigChange | Self::Interfaces)
    }
}

impl std::fmt::Display for RebootReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Resize => "resize",
            Self::PrivateIp => "private ip",
            Self::BootConfig => "boot config",
            Self::ConfigChange => "config change",
            Self::Interfaces => "interfaces",
            Self::DiskChange => "disk change",
        };
        write!(f, "{s}")
    }
}

/// Power action at the end of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Leave the instance as it is.
    Keep,
    /// Boot an offline instance.
    Boot,
    /// Reboot a running instance.
    Reboot,
    /// Shut the instance down.
    Shutdown,
}

/// Ordered update buckets for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceUpdatePlan {
    /// Attributes sent in one instance update.
    pub simple: Option<InstanceUpdateRequest>,
    /// Plan type change.
    pub resize: Option<ResizeStep>,
    /// Allocate a private address.
    pub allocate_private_ip: bool,
    /// Enable or cancel the backup service.
    pub backups: Option<bool>,
    /// Disk changes.
    pub disks: DiskChanges,
    /// Config changes.
    pub configs: ConfigChanges,
    /// Extra address changes.
    pub extra_ips: ExtraIpChanges,
    /// New interfaces for the boot config.
    pub interfaces: Option<Vec<ConfigInterface>>,
    /// The instance must be offline before disk or resize steps.
    pub needs_offline: bool,
    /// Restart reasons, after `skip_implicit_reboots`.
    pub reasons: Vec<RebootReason>,
    /// Final power action.
    pub power: PowerAction,
    /// Config to boot into.
    pub boot_config_label: Option<String>,
}

impl InstanceUpdatePlan {
    /// True when the update issues no writes.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.simple.is_none()
            && self.resize.is_none()
            && !self.allocate_private_ip
            && self.backups.is_none()
            && self.disks.is_empty()
            && self.configs.is_empty()
            && self.extra_ips.is_empty()
            && self.interfaces.is_none()
            && self.power == PowerAction::Keep
    }

    /// Resize step to run before disk changes.
    #[must_use]
    pub fn upsize(&self) -> Option<&ResizeStep> {
        self.resize.as_ref().filter(|r| r.change.is_upsize())
    }

    /// Resize step to run after disk changes.
    #[must_use]
    pub fn downsize(&self) -> Option<&ResizeStep> {
        self.resize.as_ref().filter(|r| !r.change.is_upsize())
    }
}

/// Checks a desired model before create.
///
/// # Errors
///
/// Returns the first problem found: missing credentials, an image combined
/// with explicit disks, disk expansion with explicit disks, duplicate labels,
/// unresolved device labels or an ambiguous boot config.
pub fn validate_instance(model: &InstanceModel) -> Result<()> {
    if let Err(errors) = model.validate() {
        return Err(PlanError::Invalid {
            path: String::from("root_pass"),
            message: errors.to_string(),
        }
        .into());
    }
    // Lists read back from an image deploy carry remote ids.
    let declares_layout = model.disk.iter().any(|d| d.id.is_none())
        || model.config.iter().any(|c| c.id.is_none());
    if model.image.is_some() && declares_layout {
        return Err(PlanError::Invalid {
            path: String::from("image"),
            message: String::from("image conflicts with explicit disk and config blocks"),
        }
        .into());
    }
    if !model.is_explicit() {
        return Ok(());
    }
    if model.disk_expansion {
        return Err(PlanError::ExpansionWithExplicitDisks.into());
    }

    let mut labels = BTreeSet::new();
    for disk in &model.disk {
        if !labels.insert(disk.label.as_str()) {
            return Err(PlanError::Invalid {
                path: String::from("disk"),
                message: format!("duplicate disk label '{}'", disk.label),
            }
            .into());
        }
    }
    let mut config_labels = BTreeSet::new();
    for config in &model.config {
        if !config_labels.insert(config.label.as_str()) {
            return Err(PlanError::Invalid {
                path: String::from("config"),
                message: format!("duplicate config label '{}'", config.label),
            }
            .into());
        }
        for (slot, device) in config.devices.iter().flat_map(DevicesModel::slots) {
            check_device(config, slot, device, &labels)?;
        }
    }
    model.boot_config()?;
    Ok(())
}

fn check_device(
    config: &ConfigModel,
    slot: DeviceSlot,
    device: &DeviceModel,
    disk_labels: &BTreeSet<&str>,
) -> Result<()> {
    let has_disk = device.disk_label.is_some() || device.disk_id.is_some();
    if has_disk && device.volume_id.is_some() {
        return Err(PlanError::Invalid {
            path: format!("config.{}.devices.{slot}", config.label),
            message: String::from("a device slot holds either a disk or a volume, not both"),
        }
        .into());
    }
    if let Some(label) = device.disk_label.as_deref()
        && !disk_labels.contains(label)
    {
        return Err(PlanError::UnknownDiskLabel {
            config: config.label.clone(),
            slot: slot.to_string(),
            label: label.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Classifies the changes between `prior` and `desired`.
///
/// `type_change` carries the plan allowances and must be present whenever the
/// plan type changes.
///
/// # Errors
///
/// Returns a `PlanError` for every change that cannot be applied in place.
pub fn plan_instance_update(
    prior: &InstanceModel,
    desired: &InstanceModel,
    type_change: Option<TypeChange>,
    skip_implicit_reboots: bool,
) -> Result<InstanceUpdatePlan> {
    if prior.region != desired.region {
        return Err(PlanError::RegionChange {
            from: prior.region.clone(),
            to: desired.region.clone(),
        }
        .into());
    }
    if prior.private_ip && !desired.private_ip {
        return Err(PlanError::PrivateIpDisable.into());
    }

    let explicit = desired.is_explicit();
    if explicit && desired.disk_expansion {
        return Err(PlanError::ExpansionWithExplicitDisks.into());
    }

    let mut reasons = Vec::new();

    let resize = plan_resize(prior, desired, type_change, explicit)?;
    if resize.is_some() {
        reasons.push(RebootReason::Resize);
    }

    let allocate_private_ip = desired.private_ip && !prior.private_ip;
    if allocate_private_ip {
        reasons.push(RebootReason::PrivateIp);
    }

    let backups = match (prior.backups_enabled, desired.backups_enabled) {
        (before, Some(after)) if before.unwrap_or(false) != after => Some(after),
        _ => None,
    };

    let (disks, configs) = if explicit {
        if resize.is_none() {
            let allowance = prior.specs.map(|s| s.disk).unwrap_or(u64::MAX);
            let total = desired.total_disk_size();
            if allowance > 0 && total > allowance {
                return Err(PlanError::DisksExceedAllowance {
                    plan_type: desired.plan_type.clone(),
                    allowance_mb: allowance,
                    total_mb: total,
                }
                .into());
            }
        }
        (plan_disks(prior, desired)?, plan_configs(prior, desired))
    } else {
        (plan_swap(prior, desired), ConfigChanges::default())
    };
    if !disks.is_empty() {
        reasons.push(RebootReason::DiskChange);
    }

    let boot_config = if explicit {
        desired.boot_config()?
    } else {
        desired.boot_config().ok().flatten()
    };
    let boot_config_label = boot_config.map(|c| c.label.clone());
    if desired.boot_config_label.is_some() && prior.boot_config_label != desired.boot_config_label {
        reasons.push(RebootReason::BootConfig);
    }
    if configs
        .update
        .iter()
        .map(|(_, c)| &c.label)
        .chain(configs.create.iter().map(|c| &c.label))
        .any(|label| Some(label) == boot_config_label.as_ref())
    {
        reasons.push(RebootReason::ConfigChange);
    }

    let interfaces = (prior.interface != desired.interface).then(|| desired.interface.clone());
    if interfaces.is_some() {
        reasons.push(RebootReason::Interfaces);
    }

    if skip_implicit_reboots {
        reasons.retain(|r| {
            let keep = !r.is_implicit();
            if !keep {
                debug!("Skipping implicit reboot for {r}");
            }
            keep
        });
    }

    let needs_offline = resize.is_some() || !disks.is_empty();
    let prior_booted = prior.booted.unwrap_or(true);
    let desired_booted = desired.booted.unwrap_or(prior_booted);
    let offline_after_steps = !prior_booted || needs_offline;
    let power = match (desired_booted, offline_after_steps) {
        (false, true) => PowerAction::Keep,
        (false, false) => PowerAction::Shutdown,
        (true, true) => PowerAction::Boot,
        (true, false) if !reasons.is_empty() => PowerAction::Reboot,
        (true, false) => PowerAction::Keep,
    };

    let plan = InstanceUpdatePlan {
        simple: plan_simple(prior, desired),
        resize,
        allocate_private_ip,
        backups,
        disks,
        configs,
        extra_ips: plan_extra_ips(prior, desired),
        interfaces,
        needs_offline,
        reasons,
        power,
        boot_config_label,
    };
    debug!("Planned instance update: {plan:?}");
    Ok(plan)
}

fn plan_simple(prior: &InstanceModel, desired: &InstanceModel) -> Option<InstanceUpdateRequest> {
    let changed = |a: &Option<String>, b: &Option<String>| {
        b.as_ref().filter(|b| a.as_deref().unwrap_or_default() != b.as_str()).cloned()
    };

    let mut prior_tags = prior.tags.clone();
    prior_tags.sort();
    let mut desired_tags = desired.tags.clone();
    desired_tags.sort();

    let schedule = desired
        .backups
        .as_ref()
        .and_then(|b| b.schedule.clone())
        .filter(|s| {
            let current = prior.backups.as_ref().and_then(|b| b.schedule.clone()).unwrap_or_default();
            (s.day.is_some() && s.day != current.day) || (s.window.is_some() && s.window != current.window)
        });

    let request = InstanceUpdateRequest {
        label: changed(&prior.label, &desired.label),
        group: changed(&prior.group, &desired.group),
        tags: (prior_tags != desired_tags).then_some(desired_tags),
        watchdog_enabled: (prior.watchdog_enabled != desired.watchdog_enabled)
            .then_some(desired.watchdog_enabled),
        alerts: desired.alerts.filter(|a| prior.alerts.unwrap_or_default() != *a),
        backups: schedule.map(|schedule| BackupsUpdate { schedule }),
    };
    (!request.is_empty()).then_some(request)
}

fn plan_resize(
    prior: &InstanceModel,
    desired: &InstanceModel,
    type_change: Option<TypeChange>,
    explicit: bool,
) -> Result<Option<ResizeStep>> {
    if prior.plan_type == desired.plan_type {
        return Ok(None);
    }
    let change = type_change.ok_or_else(|| {
        crate::error::ProviderError::internal("plan type changed without type allowances")
    })?;

    let used = if explicit {
        desired.total_disk_size()
    } else {
        prior.total_disk_size()
    };
    if change.to_disk_mb < used {
        return Err(PlanError::ResizeDoesNotFit {
            target_type: desired.plan_type.clone(),
            allowance_mb: change.to_disk_mb,
            used_mb: used,
        }
        .into());
    }

    let expand = if desired.disk_expansion && !explicit && change.to_disk_mb > change.from_disk_mb {
        prior
            .disk
            .iter()
            .filter_map(|d| d.id.map(|id| (id, d)))
            .max_by_key(|(_, d)| d.size)
            .map(|(id, d)| DiskResize {
                disk_id: id,
                label: d.label.clone(),
                size: d.size + (change.to_disk_mb - change.from_disk_mb),
            })
    } else {
        None
    };

    Ok(Some(ResizeStep {
        plan_type: desired.plan_type.clone(),
        migration_type: desired.migration_type,
        change,
        expand,
    }))
}

fn plan_disks(prior: &InstanceModel, desired: &InstanceModel) -> Result<DiskChanges> {
    let current: HashMap<&str, &DiskModel> =
        prior.disk.iter().map(|d| (d.label.as_str(), d)).collect();
    let mut changes = DiskChanges::default();

    for disk in &desired.disk {
        let Some(existing) = current.get(disk.label.as_str()) else {
            changes.create.push(disk.clone());
            continue;
        };
        if let (Some(from), Some(to)) = (existing.filesystem, disk.filesystem)
            && from != to
        {
            return Err(PlanError::FilesystemChange {
                label: disk.label.clone(),
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        if existing.size != disk.size
            && let Some(id) = existing.id
        {
            changes.resize.push(DiskResize {
                disk_id: id,
                label: disk.label.clone(),
                size: disk.size,
            });
        }
    }

    for disk in &prior.disk {
        if !desired.disk.iter().any(|d| d.label == disk.label)
            && let Some(id) = disk.id
        {
            changes.delete.push((id, disk.label.clone()));
        }
    }
    Ok(changes)
}

/// `swap_size` on an implicit instance resizes its swap disk.
fn plan_swap(prior: &InstanceModel, desired: &InstanceModel) -> DiskChanges {
    let mut changes = DiskChanges::default();
    if let Some(size) = desired.swap_size
        && prior.swap_size.is_some_and(|current| current != size)
        && let Some(swap) = prior
            .disk
            .iter()
            .find(|d| d.filesystem == Some(Filesystem::Swap))
        && let Some(id) = swap.id
    {
        changes.resize.push(DiskResize {
            disk_id: id,
            label: swap.label.clone(),
            size,
        });
    }
    changes
}

fn plan_configs(prior: &InstanceModel, desired: &InstanceModel) -> ConfigChanges {
    let mut changes = ConfigChanges::default();
    for config in &desired.config {
        match prior.config.iter().find(|c| c.label == config.label) {
            None => changes.create.push(config.clone()),
            Some(existing) => {
                if config_changed(existing, config)
                    && let Some(id) = existing.id
                {
                    changes.update.push((id, config.clone()));
                }
            }
        }
    }
    for config in &prior.config {
        if !desired.config.iter().any(|c| c.label == config.label)
            && let Some(id) = config.id
        {
            changes.delete.push((id, config.label.clone()));
        }
    }
    changes
}

/// Compares only what the desired config sets.
fn config_changed(current: &ConfigModel, desired: &ConfigModel) -> bool {
    fn differs<T: PartialEq>(current: Option<&T>, desired: Option<&T>) -> bool {
        desired.is_some_and(|d| current != Some(d))
    }

    differs(current.kernel.as_ref(), desired.kernel.as_ref())
        || differs(current.run_level.as_ref(), desired.run_level.as_ref())
        || differs(current.virt_mode.as_ref(), desired.virt_mode.as_ref())
        || differs(current.root_device.as_ref(), desired.root_device.as_ref())
        || differs(current.memory_limit.as_ref(), desired.memory_limit.as_ref())
        || differs(current.helpers.as_ref(), desired.helpers.as_ref())
        || desired
            .comments
            .as_deref()
            .is_some_and(|c| current.comments.as_deref().unwrap_or_default() != c)
        || current.interface != desired.interface
        || desired
            .devices
            .as_ref()
            .is_some_and(|d| devices_changed(current.devices.as_ref(), d))
}

fn devices_changed(current: Option<&DevicesModel>, desired: &DevicesModel) -> bool {
    DeviceSlot::ALL.into_iter().any(|slot| {
        let before = current.and_then(|c| c.get(slot));
        match (before, desired.get(slot)) {
            (None, None) => false,
            (Some(_), None) | (None, Some(_)) => true,
            (Some(before), Some(after)) => {
                if after.disk_label.is_some() {
                    after.disk_label != before.disk_label
                } else {
                    after.disk_id != before.disk_id || after.volume_id != before.volume_id
                }
            }
        }
    })
}

/// Extra addresses are counted per public flag; surplus ones are released
/// from the end.
fn plan_extra_ips(prior: &InstanceModel, desired: &InstanceModel) -> ExtraIpChanges {
    let mut changes = ExtraIpChanges::default();
    for public in [true, false] {
        let want = desired.extra_ip.iter().filter(|ip| ip.public == public).count();
        let have: Vec<&str> = prior
            .extra_ip
            .iter()
            .filter(|ip| ip.public == public)
            .filter_map(|ip| ip.address.as_deref())
            .collect();
        if want > have.len() {
            changes
                .allocate
                .extend(std::iter::repeat_n(public, want - have.len()));
        } else {
            changes
                .release
                .extend(have[want..].iter().map(ToString::to_string));
        }
    }
    changes
}
