//! Instance models and their translation to and from the API.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{PlanError, Result, SchemaError};
use crate::linode::types::{
    BackupSchedule, ConfigDevice, ConfigDeviceMap, ConfigHelpers, ConfigInterface, ConfigRequest,
    DeviceSlot, Disk, DiskCreateRequest, Filesystem, Instance, InstanceAlerts, InstanceConfig,
    InstanceCreateRequest, InstanceIpAddresses, InstanceSpecs, IpAddress, MigrationType,
};

use super::single_block;

/// Plan type used when none is declared.
pub const DEFAULT_PLAN_TYPE: &str = "g6-standard-1";

/// Typed view of a `linode_instance` attribute tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_credentials"))]
pub struct InstanceModel {
    /// Remote id as a decimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Display group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Region.
    pub region: String,
    /// Plan type.
    #[serde(rename = "type")]
    pub plan_type: String,
    /// Image for the simple path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Backup to restore from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<u64>,
    /// StackScript to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stackscript_id: Option<u64>,
    /// StackScript data.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
    /// Root password; a digest once stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_pass: Option<String>,
    /// SSH keys for root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_keys: Vec<String>,
    /// Users whose keys are installed for root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_users: Vec<String>,
    /// Swap size in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_size: Option<u64>,
    /// Private IPv4 enabled.
    pub private_ip: bool,
    /// Backup service enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backups_enabled: Option<bool>,
    /// Shutdown watchdog.
    pub watchdog_enabled: bool,
    /// Desired power state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booted: Option<bool>,
    /// Config to boot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_config_label: Option<String>,
    /// Grow the implicit disk on upsize.
    pub disk_expansion: bool,
    /// Resize strategy.
    pub migration_type: MigrationType,
    /// Tags.
    pub tags: Vec<String>,
    /// Alert thresholds.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub alerts: Option<InstanceAlerts>,
    /// Backup service state.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub backups: Option<BackupsModel>,
    /// Plan specs.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub specs: Option<InstanceSpecs>,
    /// Observed status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// First public IPv4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// First private IPv4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip_address: Option<String>,
    /// Public IPv4 addresses.
    pub ipv4: Vec<String>,
    /// IPv6 SLAAC address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    /// Interfaces of the boot config.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interface: Vec<ConfigInterface>,
    /// Disks.
    pub disk: Vec<DiskModel>,
    /// Boot configs.
    pub config: Vec<ConfigModel>,
    /// Additional addresses.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_ip: Vec<ExtraIpModel>,
}

impl Default for InstanceModel {
    fn default() -> Self {
        Self {
            id: None,
            label: None,
            group: None,
            region: String::new(),
            plan_type: DEFAULT_PLAN_TYPE.to_string(),
            image: None,
            backup_id: None,
            stackscript_id: None,
            stackscript_data: BTreeMap::new(),
            root_pass: None,
            authorized_keys: Vec::new(),
            authorized_users: Vec::new(),
            swap_size: None,
            private_ip: false,
            backups_enabled: None,
            watchdog_enabled: true,
            booted: None,
            boot_config_label: None,
            disk_expansion: false,
            migration_type: MigrationType::Cold,
            tags: Vec::new(),
            alerts: None,
            backups: None,
            specs: None,
            status: None,
            ip_address: None,
            private_ip_address: None,
            ipv4: Vec::new(),
            ipv6: None,
            interface: Vec::new(),
            disk: Vec::new(),
            config: Vec::new(),
            extra_ip: Vec::new(),
        }
    }
}

fn validate_credentials(model: &InstanceModel) -> std::result::Result<(), validator::ValidationError> {
    let has_credentials = model.root_pass.as_deref().is_some_and(|p| !p.is_empty())
        || !model.authorized_keys.is_empty()
        || !model.authorized_users.is_empty();
    if model.image.is_some() && !model.is_explicit() && !has_credentials {
        let mut err = validator::ValidationError::new("credentials");
        err.message = Some("image requires root_pass, authorized_keys or authorized_users".into());
        return Err(err);
    }
    Ok(())
}

impl InstanceModel {
    /// True when disks or configs are declared, selecting the composite path.
    ///
    /// An instance deployed from an image or a backup owns its disks
    /// implicitly; the lists it carries are then read-only mirrors.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.image.is_none()
            && self.backup_id.is_none()
            && (!self.disk.is_empty() || !self.config.is_empty())
    }

    /// Remote id.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is missing or not numeric.
    pub fn instance_id(&self) -> Result<u64> {
        parse_instance_id(self.id.as_deref().unwrap_or_default())
    }

    /// Label of the config to boot.
    ///
    /// The declared `boot_config_label` wins; otherwise the only config.
    /// No configs gives `None`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBootConfig` or `AmbiguousBootConfig`.
    pub fn boot_config(&self) -> Result<Option<&ConfigModel>> {
        if let Some(label) = self.boot_config_label.as_deref() {
            return self
                .config
                .iter()
                .find(|c| c.label == label)
                .map(Some)
                .ok_or_else(|| {
                    PlanError::UnknownBootConfig {
                        label: label.to_string(),
                    }
                    .into()
                });
        }
        match self.config.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only)),
            many => Err(PlanError::AmbiguousBootConfig { count: many.len() }.into()),
        }
    }

    /// Total declared disk size in MB.
    #[must_use]
    pub fn total_disk_size(&self) -> u64 {
        self.disk.iter().map(|d| d.size).sum()
    }
}

/// Parses an instance id.
///
/// # Errors
///
/// Returns `Invalid` for anything but a positive decimal integer.
pub fn parse_instance_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            SchemaError::Invalid {
                path: String::from("id"),
                message: format!("'{raw}' is not a valid instance id"),
            }
            .into()
        })
}

/// Backup service state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupsModel {
    /// Service enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Preferred window.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub schedule: Option<BackupSchedule>,
}

/// One declared disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiskModel {
    /// Remote id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Label; the key disks are matched by.
    pub label: String,
    /// Size in MB.
    pub size: u64,
    /// Filesystem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<Filesystem>,
    /// Image to deploy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Root password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_pass: Option<String>,
    /// SSH keys for root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_keys: Vec<String>,
    /// Users whose keys are installed for root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_users: Vec<String>,
    /// StackScript to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stackscript_id: Option<u64>,
    /// StackScript data.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
}

impl DiskModel {
    /// True when the disk deploys an image without any credential.
    #[must_use]
    pub fn needs_generated_password(&self) -> bool {
        self.image.is_some()
            && self.root_pass.as_deref().is_none_or(str::is_empty)
            && self.authorized_keys.is_empty()
            && self.authorized_users.is_empty()
    }
}

/// One device slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceModel {
    /// Label of a declared disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_label: Option<String>,
    /// Disk id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<u64>,
    /// Volume id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<u64>,
}

/// Device table of a config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[allow(missing_docs)]
pub struct DevicesModel {
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sda: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sdb: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sdc: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sdd: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sde: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sdf: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sdg: Option<DeviceModel>,
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub sdh: Option<DeviceModel>,
}

impl DevicesModel {
    /// Device in a slot.
    #[must_use]
    pub const fn get(&self, slot: DeviceSlot) -> Option<&DeviceModel> {
        match slot {
            DeviceSlot::Sda => self.sda.as_ref(),
            DeviceSlot::Sdb => self.sdb.as_ref(),
            DeviceSlot::Sdc => self.sdc.as_ref(),
            DeviceSlot::Sdd => self.sdd.as_ref(),
            DeviceSlot::Sde => self.sde.as_ref(),
            DeviceSlot::Sdf => self.sdf.as_ref(),
            DeviceSlot::Sdg => self.sdg.as_ref(),
            DeviceSlot::Sdh => self.sdh.as_ref(),
        }
    }

    /// Sets a slot.
    pub fn set(&mut self, slot: DeviceSlot, device: Option<DeviceModel>) {
        let target = match slot {
            DeviceSlot::Sda => &mut self.sda,
            DeviceSlot::Sdb => &mut self.sdb,
            DeviceSlot::Sdc => &mut self.sdc,
            DeviceSlot::Sdd => &mut self.sdd,
            DeviceSlot::Sde => &mut self.sde,
            DeviceSlot::Sdf => &mut self.sdf,
            DeviceSlot::Sdg => &mut self.sdg,
            DeviceSlot::Sdh => &mut self.sdh,
        };
        *target = device;
    }

    /// Declared slots in order.
    pub fn slots(&self) -> impl Iterator<Item = (DeviceSlot, &DeviceModel)> {
        DeviceSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|device| (slot, device)))
    }
}

/// One declared boot config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigModel {
    /// Remote id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Label; the key configs are matched by.
    pub label: String,
    /// Kernel id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    /// Run level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_level: Option<String>,
    /// Virtualization mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virt_mode: Option<String>,
    /// Root device path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_device: Option<String>,
    /// Comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Memory limit in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    /// Device table.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub devices: Option<DevicesModel>,
    /// Helpers.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub helpers: Option<ConfigHelpers>,
    /// Interfaces.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interface: Vec<ConfigInterface>,
}

/// One additional IPv4 address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtraIpModel {
    /// Public or private.
    pub public: bool,
    /// Allocated address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Prefix length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<u32>,
    /// Subnet mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,
    /// Reverse DNS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdns: Option<String>,
    /// Region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Address type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ip_type: Option<String>,
}

impl Default for ExtraIpModel {
    fn default() -> Self {
        Self {
            public: true,
            address: None,
            gateway: None,
            prefix: None,
            subnet_mask: None,
            rdns: None,
            region: None,
            ip_type: None,
        }
    }
}

impl From<&IpAddress> for ExtraIpModel {
    fn from(ip: &IpAddress) -> Self {
        Self {
            public: ip.public,
            address: Some(ip.address.clone()),
            gateway: ip.gateway.clone(),
            prefix: Some(ip.prefix),
            subnet_mask: Some(ip.subnet_mask.clone()),
            rdns: ip.rdns.clone(),
            region: Some(ip.region.clone()),
            ip_type: Some(ip.address_type.clone()),
        }
    }
}

/// Everything Read observes about an instance.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    /// The instance.
    pub instance: Instance,
    /// Its disks.
    pub disks: Vec<Disk>,
    /// Its configs.
    pub configs: Vec<InstanceConfig>,
    /// Its addresses.
    pub ips: InstanceIpAddresses,
}

/// Builds a model from observed state.
///
/// Values the API never returns (secrets, creation-only disk fields,
/// provider settings) are carried over from `prior`.
#[must_use]
pub fn flatten_instance(snapshot: &InstanceSnapshot, prior: &InstanceModel) -> InstanceModel {
    let instance = &snapshot.instance;
    let public = &snapshot.ips.ipv4.public;
    let private = &snapshot.ips.ipv4.private;

    let disk_labels: HashMap<u64, &str> = snapshot
        .disks
        .iter()
        .map(|d| (d.id, d.label.as_str()))
        .collect();

    let disks = order_by_labels(
        snapshot.disks.iter().map(|d| flatten_disk(d, prior)).collect(),
        prior.disk.iter().map(|d| d.label.as_str()),
        |d| d.label.as_str(),
    );
    let configs = order_by_labels(
        snapshot
            .configs
            .iter()
            .map(|c| flatten_config(c, &disk_labels))
            .collect(),
        prior.config.iter().map(|c| c.label.as_str()),
        |c| c.label.as_str(),
    );

    let boot_config_label = prior
        .boot_config_label
        .as_deref()
        .filter(|label| configs.iter().any(|c| c.label == *label))
        .map(ToString::to_string)
        .or_else(|| match configs.as_slice() {
            [only] => Some(only.label.clone()),
            _ => None,
        });

    let interface = if prior.interface.is_empty() {
        Vec::new()
    } else {
        boot_config_label
            .as_deref()
            .and_then(|label| snapshot.configs.iter().find(|c| c.label == label))
            .map(|c| c.interfaces.clone())
            .unwrap_or_default()
    };

    let (extra_ip, private) = match_extra_ips(&prior.extra_ip, public, private, prior.private_ip);

    let swap_size = snapshot
        .disks
        .iter()
        .filter(|d| d.filesystem == Filesystem::Swap)
        .map(|d| d.size)
        .sum();

    let mut tags = instance.tags.clone();
    tags.sort();

    InstanceModel {
        id: Some(instance.id.to_string()),
        label: Some(instance.label.clone()),
        group: Some(instance.group.clone()).filter(|g| !g.is_empty()),
        region: instance.region.clone(),
        plan_type: instance.plan_type.clone().unwrap_or_default(),
        image: prior.image.clone().or_else(|| instance.image.clone()),
        backup_id: prior.backup_id,
        stackscript_id: prior.stackscript_id,
        stackscript_data: prior.stackscript_data.clone(),
        root_pass: prior.root_pass.clone(),
        authorized_keys: prior.authorized_keys.clone(),
        authorized_users: prior.authorized_users.clone(),
        swap_size: Some(swap_size),
        private_ip: !private.is_empty(),
        backups_enabled: Some(instance.backups.enabled),
        watchdog_enabled: instance.watchdog_enabled,
        booted: Some(instance.status.is_booted()),
        boot_config_label,
        disk_expansion: prior.disk_expansion,
        migration_type: prior.migration_type,
        tags,
        alerts: Some(instance.alerts),
        backups: Some(BackupsModel {
            enabled: Some(instance.backups.enabled),
            schedule: Some(instance.backups.schedule.clone()),
        }),
        specs: Some(instance.specs),
        status: Some(instance.status.to_string()),
        ip_address: public.first().map(|ip| ip.address.clone()),
        private_ip_address: private.first().map(|ip| ip.address.clone()),
        ipv4: public.iter().map(|ip| ip.address.clone()).collect(),
        ipv6: instance.ipv6.clone(),
        interface,
        disk: disks,
        config: configs,
        extra_ip,
    }
}

/// Pairs declared extra addresses with observed ones.
///
/// Entries holding an address keep it while the instance still has it.
/// Entries without one take an unclaimed address of the same kind; the
/// primary public address and, when `private_ip` is set, one private
/// address are never handed out. Returns the extras and the private
/// addresses no extra holds.
fn match_extra_ips<'a>(
    declared: &[ExtraIpModel],
    public: &'a [IpAddress],
    private: &'a [IpAddress],
    private_ip: bool,
) -> (Vec<ExtraIpModel>, Vec<&'a IpAddress>) {
    let mut claimed: HashSet<&'a str> = public
        .iter()
        .chain(private)
        .map(|ip| ip.address.as_str())
        .filter(|address| declared.iter().any(|d| d.address.as_deref() == Some(*address)))
        .collect();
    if let Some(primary) = public.first() {
        claimed.insert(primary.address.as_str());
    }
    if private_ip {
        claim_address(private, &mut claimed);
    }

    let extras: Vec<ExtraIpModel> = declared
        .iter()
        .filter_map(|d| match d.address.as_deref() {
            Some(address) => public.iter().chain(private).find(|ip| ip.address == address),
            None => claim_address(if d.public { public } else { private }, &mut claimed),
        })
        .map(ExtraIpModel::from)
        .collect();

    let held: HashSet<&str> = extras.iter().filter_map(|e| e.address.as_deref()).collect();
    let unheld = private
        .iter()
        .filter(|ip| !held.contains(ip.address.as_str()))
        .collect();
    (extras, unheld)
}

fn claim_address<'a>(pool: &'a [IpAddress], claimed: &mut HashSet<&'a str>) -> Option<&'a IpAddress> {
    let ip = pool.iter().find(|ip| !claimed.contains(ip.address.as_str()))?;
    claimed.insert(ip.address.as_str());
    Some(ip)
}

fn flatten_disk(disk: &Disk, prior: &InstanceModel) -> DiskModel {
    let declared = prior.disk.iter().find(|d| d.label == disk.label);
    DiskModel {
        id: Some(disk.id),
        label: disk.label.clone(),
        size: disk.size,
        filesystem: Some(disk.filesystem),
        image: declared.and_then(|d| d.image.clone()),
        root_pass: declared.and_then(|d| d.root_pass.clone()),
        authorized_keys: declared.map(|d| d.authorized_keys.clone()).unwrap_or_default(),
        authorized_users: declared.map(|d| d.authorized_users.clone()).unwrap_or_default(),
        stackscript_id: declared.and_then(|d| d.stackscript_id),
        stackscript_data: declared.map(|d| d.stackscript_data.clone()).unwrap_or_default(),
    }
}

fn flatten_config(config: &InstanceConfig, disk_labels: &HashMap<u64, &str>) -> ConfigModel {
    let mut devices = DevicesModel::default();
    for (slot, device) in config.devices.occupied() {
        devices.set(
            slot,
            Some(DeviceModel {
                disk_label: device
                    .disk_id
                    .and_then(|id| disk_labels.get(&id))
                    .map(ToString::to_string),
                disk_id: device.disk_id,
                volume_id: device.volume_id,
            }),
        );
    }

    ConfigModel {
        id: Some(config.id),
        label: config.label.clone(),
        kernel: Some(config.kernel.clone()),
        run_level: Some(config.run_level.clone()),
        virt_mode: Some(config.virt_mode.clone()),
        root_device: Some(config.root_device.clone()),
        comments: Some(config.comments.clone()).filter(|c| !c.is_empty()),
        memory_limit: Some(config.memory_limit),
        devices: Some(devices),
        helpers: Some(config.helpers),
        interface: config.interfaces.clone(),
    }
}

/// Orders observed items to follow the declared labels; the rest keep their
/// observed order at the end.
fn order_by_labels<'l, T, K>(items: Vec<T>, labels: impl Iterator<Item = &'l str>, key: K) -> Vec<T>
where
    K: Fn(&T) -> &str,
{
    let mut remaining: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());
    for label in labels {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|item| key(item) == label))
        {
            ordered.extend(slot.take());
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    ordered
}

/// Create request for the instance itself.
///
/// In the composite path only the bare instance is requested; disks,
/// configs and addresses follow as separate calls.
#[must_use]
pub fn expand_create_request(model: &InstanceModel) -> InstanceCreateRequest {
    let simple = !model.is_explicit();
    InstanceCreateRequest {
        region: model.region.clone(),
        plan_type: model.plan_type.clone(),
        label: model.label.clone().unwrap_or_default(),
        group: model.group.clone().unwrap_or_default(),
        tags: model.tags.clone(),
        image: model.image.clone().filter(|_| simple),
        root_pass: model.root_pass.clone().filter(|_| simple),
        authorized_keys: if simple { model.authorized_keys.clone() } else { Vec::new() },
        authorized_users: if simple { model.authorized_users.clone() } else { Vec::new() },
        stackscript_id: model.stackscript_id.filter(|_| simple),
        stackscript_data: if simple {
            model.stackscript_data.clone()
        } else {
            BTreeMap::new()
        },
        backup_id: model.backup_id,
        swap_size: model.swap_size.filter(|_| simple && model.image.is_some()),
        private_ip: simple && model.private_ip,
        backups_enabled: model.backups_enabled.unwrap_or(false),
        booted: simple && model.booted.unwrap_or(true),
        interfaces: if simple { model.interface.clone() } else { Vec::new() },
    }
}

/// Create request for one disk.
#[must_use]
pub fn expand_disk_request(disk: &DiskModel) -> DiskCreateRequest {
    DiskCreateRequest {
        label: disk.label.clone(),
        size: disk.size,
        filesystem: disk.filesystem,
        image: disk.image.clone(),
        root_pass: disk.root_pass.clone().filter(|p| !p.is_empty()),
        authorized_keys: disk.authorized_keys.clone(),
        authorized_users: disk.authorized_users.clone(),
        stackscript_id: disk.stackscript_id,
        stackscript_data: disk.stackscript_data.clone(),
    }
}

/// Create or update request for a config.
///
/// Device slots naming a disk label are resolved through `disk_ids`.
/// Attributes the model leaves unset keep the values of `current`.
///
/// # Errors
///
/// Returns `UnknownDiskLabel` for an unresolved label, or `Invalid` when a
/// slot names both a disk and a volume.
pub fn expand_config_request(
    config: &ConfigModel,
    disk_ids: &HashMap<String, u64>,
    current: Option<&InstanceConfig>,
) -> Result<ConfigRequest> {
    let devices = match &config.devices {
        Some(declared) => {
            let mut map = ConfigDeviceMap::default();
            for (slot, device) in declared.slots() {
                map.set(slot, resolve_device(config, slot, device, disk_ids)?);
            }
            map
        }
        None => current.map(|c| c.devices).unwrap_or_default(),
    };

    let pick = |declared: &Option<String>, observed: Option<&String>, fallback: &str| {
        declared
            .clone()
            .or_else(|| observed.cloned())
            .unwrap_or_else(|| fallback.to_string())
    };

    Ok(ConfigRequest {
        label: config.label.clone(),
        kernel: config
            .kernel
            .clone()
            .or_else(|| current.map(|c| c.kernel.clone())),
        run_level: pick(&config.run_level, current.map(|c| &c.run_level), "default"),
        virt_mode: pick(&config.virt_mode, current.map(|c| &c.virt_mode), "paravirt"),
        root_device: config
            .root_device
            .clone()
            .or_else(|| current.map(|c| c.root_device.clone())),
        comments: pick(&config.comments, current.map(|c| &c.comments), ""),
        memory_limit: config
            .memory_limit
            .or_else(|| current.map(|c| c.memory_limit))
            .unwrap_or(0),
        devices,
        helpers: config
            .helpers
            .or_else(|| current.map(|c| c.helpers))
            .unwrap_or_default(),
        interfaces: config.interface.clone(),
    })
}

fn resolve_device(
    config: &ConfigModel,
    slot: DeviceSlot,
    device: &DeviceModel,
    disk_ids: &HashMap<String, u64>,
) -> Result<Option<ConfigDevice>> {
    let has_disk = device.disk_label.is_some() || device.disk_id.is_some();
    if has_disk && device.volume_id.is_some() {
        return Err(PlanError::Invalid {
            path: format!("config.{}.devices.{slot}", config.label),
            message: String::from("a device slot holds either a disk or a volume, not both"),
        }
        .into());
    }

    if let Some(label) = device.disk_label.as_deref() {
        let id = disk_ids.get(label).ok_or_else(|| PlanError::UnknownDiskLabel {
            config: config.label.clone(),
            slot: slot.to_string(),
            label: label.to_string(),
        })?;
        return Ok(Some(ConfigDevice {
            disk_id: Some(*id),
            volume_id: None,
        }));
    }

    Ok(Some(ConfigDevice {
        disk_id: device.disk_id,
        volume_id: device.volume_id,
    })
    .filter(|d| d.disk_id.is_some() || d.volume_id.is_some()))
}

/// One entry of the `linode_instances` data source.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceView {
    /// Instance id.
    pub id: u64,
    /// Label.
    pub label: String,
    /// Display group.
    pub group: String,
    /// Region.
    pub region: String,
    /// Plan type.
    #[serde(rename = "type")]
    pub plan_type: String,
    /// Image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Status.
    pub status: String,
    /// First public IPv4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// First private IPv4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip_address: Option<String>,
    /// Public IPv4 addresses.
    pub ipv4: Vec<String>,
    /// IPv6 SLAAC address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Shutdown watchdog.
    pub watchdog_enabled: bool,
    /// Plan specs.
    #[serde(with = "single_block")]
    pub specs: Option<InstanceSpecs>,
    /// Alert thresholds.
    #[serde(with = "single_block")]
    pub alerts: Option<InstanceAlerts>,
    /// Backup service state.
    #[serde(with = "single_block")]
    pub backups: Option<BackupsModel>,
}

/// Flattens a listed instance for the data source.
///
/// Listing does not return address roles, so RFC 1918 addresses count as
/// private.
#[must_use]
pub fn flatten_instance_view(instance: &Instance) -> InstanceView {
    let (private, public): (Vec<&String>, Vec<&String>) = instance
        .ipv4
        .iter()
        .partition(|ip| ip.parse::<Ipv4Addr>().is_ok_and(|addr| addr.is_private()));

    let mut tags = instance.tags.clone();
    tags.sort();

    InstanceView {
        id: instance.id,
        label: instance.label.clone(),
        group: instance.group.clone(),
        region: instance.region.clone(),
        plan_type: instance.plan_type.clone().unwrap_or_default(),
        image: instance.image.clone(),
        status: instance.status.to_string(),
        ip_address: public.first().map(|ip| (*ip).clone()),
        private_ip_address: private.first().map(|ip| (*ip).clone()),
        ipv4: public.into_iter().cloned().collect(),
        ipv6: instance.ipv6.clone(),
        tags,
        watchdog_enabled: instance.watchdog_enabled,
        specs: Some(instance.specs),
        alerts: Some(instance.alerts),
        backups: Some(BackupsModel {
            enabled: Some(instance.backups.enabled),
            schedule: Some(instance.backups.schedule.clone()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{expand, flatten};
    use crate::linode::types::{DiskStatus, InstanceBackups, InstanceStatus, Ipv4Addresses};
    use serde_json::json;

    fn composite() -> InstanceModel {
        expand(
            &json!({
                "label": "composite",
                "region": "us-east",
                "type": "g6-standard-1",
                "disk": [
                    {"label": "boot", "size": 25000, "filesystem": "ext4", "image": "linode/alpine3.14", "root_pass": "p4ssw0rd!"},
                    {"label": "swap", "size": 512, "filesystem": "swap"}
                ],
                "config": [{
                    "label": "cfg",
                    "kernel": "linode/latest-64bit",
                    "root_device": "/dev/sda",
                    "devices": [{"sda": [{"disk_label": "boot"}], "sdb": {"disk_label": "swap"}}]
                }]
            }),
            "",
        )
        .unwrap()
    }

    fn ip(address: &str, public: bool) -> IpAddress {
        IpAddress {
            address: address.to_string(),
            prefix: 24,
            public,
            address_type: "ipv4".to_string(),
            ..IpAddress::default()
        }
    }

    fn snapshot() -> InstanceSnapshot {
        InstanceSnapshot {
            instance: Instance {
                id: 42,
                label: "composite".to_string(),
                group: String::new(),
                status: InstanceStatus::Running,
                plan_type: Some("g6-standard-1".to_string()),
                region: "us-east".to_string(),
                image: None,
                ipv4: vec!["203.0.113.5".to_string(), "192.168.1.9".to_string()],
                ipv6: Some("2600:3c03::1/128".to_string()),
                tags: vec!["b".to_string(), "a".to_string()],
                watchdog_enabled: true,
                alerts: InstanceAlerts::default(),
                specs: InstanceSpecs {
                    disk: 51200,
                    memory: 2048,
                    vcpus: 1,
                    transfer: 2000,
                },
                backups: InstanceBackups::default(),
            },
            disks: vec![
                Disk {
                    id: 11,
                    label: "swap".to_string(),
                    status: DiskStatus::Ready,
                    size: 512,
                    filesystem: Filesystem::Swap,
                },
                Disk {
                    id: 10,
                    label: "boot".to_string(),
                    status: DiskStatus::Ready,
                    size: 25000,
                    filesystem: Filesystem::Ext4,
                },
            ],
            configs: vec![InstanceConfig {
                id: 20,
                label: "cfg".to_string(),
                kernel: "linode/latest-64bit".to_string(),
                run_level: "default".to_string(),
                virt_mode: "paravirt".to_string(),
                root_device: "/dev/sda".to_string(),
                comments: String::new(),
                memory_limit: 0,
                devices: {
                    let mut map = ConfigDeviceMap::default();
                    map.set(DeviceSlot::Sda, Some(ConfigDevice { disk_id: Some(10), volume_id: None }));
                    map.set(DeviceSlot::Sdb, Some(ConfigDevice { disk_id: Some(11), volume_id: None }));
                    map
                },
                helpers: ConfigHelpers::default(),
                interfaces: Vec::new(),
            }],
            ips: InstanceIpAddresses {
                ipv4: Ipv4Addresses {
                    public: vec![ip("203.0.113.5", true)],
                    private: vec![ip("192.168.1.9", false)],
                    ..Ipv4Addresses::default()
                },
                ipv6: None,
            },
        }
    }

    #[test]
    fn test_expand_composite_model() {
        let model = composite();
        assert!(model.is_explicit());
        assert_eq!(model.total_disk_size(), 25512);
        let devices = model.config[0].devices.as_ref().unwrap();
        assert_eq!(devices.sda.as_ref().unwrap().disk_label.as_deref(), Some("boot"));
        assert_eq!(model.boot_config().unwrap().unwrap().label, "cfg");
        assert!(model.watchdog_enabled);
    }

    #[test]
    fn test_flatten_reads_addresses_swap_and_devices() {
        let prior = composite();
        let model = flatten_instance(&snapshot(), &prior);

        assert_eq!(model.id.as_deref(), Some("42"));
        assert_eq!(model.swap_size, Some(512));
        assert_eq!(model.ip_address.as_deref(), Some("203.0.113.5"));
        assert_eq!(model.private_ip_address.as_deref(), Some("192.168.1.9"));
        assert!(model.private_ip);
        assert_eq!(model.ipv4, vec!["203.0.113.5"]);
        assert_eq!(model.tags, vec!["a", "b"]);
        assert_eq!(model.booted, Some(true));
        assert_eq!(model.boot_config_label.as_deref(), Some("cfg"));

        // Disks follow the declared order and keep creation-only fields.
        assert_eq!(model.disk[0].label, "boot");
        assert_eq!(model.disk[0].root_pass.as_deref(), Some("p4ssw0rd!"));
        assert_eq!(model.disk[1].label, "swap");

        let devices = model.config[0].devices.as_ref().unwrap();
        assert_eq!(devices.sda.as_ref().unwrap().disk_label.as_deref(), Some("boot"));
        assert_eq!(devices.sdb.as_ref().unwrap().disk_id, Some(11));
    }

    #[test]
    fn test_flatten_tracks_extra_ips_by_address() {
        let prior = InstanceModel {
            extra_ip: vec![
                ExtraIpModel {
                    address: Some("203.0.113.5".to_string()),
                    ..ExtraIpModel::default()
                },
                ExtraIpModel {
                    address: Some("198.51.100.1".to_string()),
                    ..ExtraIpModel::default()
                },
            ],
            ..InstanceModel::default()
        };
        let model = flatten_instance(&snapshot(), &prior);
        assert_eq!(model.extra_ip.len(), 1);
        assert_eq!(model.extra_ip[0].prefix, Some(24));
    }

    #[test]
    fn test_flatten_pairs_new_extra_ips_with_unclaimed_addresses() {
        let mut observed = snapshot();
        observed.ips.ipv4.public.push(ip("203.0.113.77", true));
        observed.ips.ipv4.private = vec![ip("192.168.1.9", false), ip("192.168.1.10", false)];
        let prior = InstanceModel {
            private_ip: true,
            extra_ip: vec![
                ExtraIpModel::default(),
                ExtraIpModel {
                    public: false,
                    ..ExtraIpModel::default()
                },
            ],
            ..InstanceModel::default()
        };

        let model = flatten_instance(&observed, &prior);
        assert_eq!(model.extra_ip.len(), 2);
        assert_eq!(model.extra_ip[0].address.as_deref(), Some("203.0.113.77"));
        assert_eq!(model.extra_ip[1].address.as_deref(), Some("192.168.1.10"));
        assert!(model.private_ip);
        assert_eq!(model.private_ip_address.as_deref(), Some("192.168.1.9"));
        assert_eq!(model.ip_address.as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_private_extra_ip_does_not_turn_on_private_ip() {
        let prior = InstanceModel {
            extra_ip: vec![ExtraIpModel {
                public: false,
                ..ExtraIpModel::default()
            }],
            ..InstanceModel::default()
        };
        let model = flatten_instance(&snapshot(), &prior);
        assert_eq!(model.extra_ip[0].address.as_deref(), Some("192.168.1.9"));
        assert!(!model.private_ip);
        assert!(model.private_ip_address.is_none());
    }

    #[test]
    fn test_simple_create_request() {
        let model: InstanceModel = expand(
            &json!({
                "label": "t1",
                "type": "g6-nanode-1",
                "image": "linode/alpine3.14",
                "region": "us-east",
                "root_pass": "p4ssw0rd!",
                "swap_size": 256
            }),
            "",
        )
        .unwrap();
        assert!(model.validate().is_ok());

        let request = expand_create_request(&model);
        assert!(request.booted);
        assert_eq!(request.swap_size, Some(256));
        assert_eq!(request.root_pass.as_deref(), Some("p4ssw0rd!"));
    }

    #[test]
    fn test_composite_create_request_is_bare() {
        let request = expand_create_request(&composite());
        assert!(!request.booted);
        assert!(request.image.is_none());
        assert!(request.root_pass.is_none());
        assert!(!request.private_ip);
    }

    #[test]
    fn test_image_without_credentials_is_invalid() {
        let model = InstanceModel {
            region: "us-east".to_string(),
            image: Some("linode/debian12".to_string()),
            ..InstanceModel::default()
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_config_request_resolves_labels() {
        let model = composite();
        let ids = HashMap::from([("boot".to_string(), 10), ("swap".to_string(), 11)]);
        let request = expand_config_request(&model.config[0], &ids, None).unwrap();
        assert_eq!(request.devices.get(DeviceSlot::Sda).unwrap().disk_id, Some(10));
        assert_eq!(request.devices.get(DeviceSlot::Sdb).unwrap().disk_id, Some(11));
        assert_eq!(request.run_level, "default");

        let missing = expand_config_request(&model.config[0], &HashMap::new(), None).unwrap_err();
        assert!(matches!(
            missing,
            crate::error::ProviderError::Plan(PlanError::UnknownDiskLabel { .. })
        ));
    }

    #[test]
    fn test_disk_and_volume_in_one_slot_is_rejected() {
        let config: ConfigModel = expand(
            &json!({"label": "cfg", "devices": {"sda": {"disk_id": 1, "volume_id": 2}}}),
            "config.0",
        )
        .unwrap();
        assert!(expand_config_request(&config, &HashMap::new(), None).is_err());
    }

    #[test]
    fn test_ambiguous_boot_config() {
        let mut model = composite();
        model.config.push(ConfigModel {
            label: "rescue".to_string(),
            ..ConfigModel::default()
        });
        assert!(model.boot_config().is_err());
        model.boot_config_label = Some("rescue".to_string());
        assert_eq!(model.boot_config().unwrap().unwrap().label, "rescue");
    }

    #[test]
    fn test_flatten_state_is_a_tree() {
        let tree = flatten(&flatten_instance(&snapshot(), &composite())).unwrap();
        assert_eq!(tree["specs"][0]["disk"], json!(51200));
        assert_eq!(tree["config"][0]["devices"][0]["sda"][0]["disk_label"], json!("boot"));
        assert_eq!(tree["type"], json!("g6-standard-1"));
    }

    #[test]
    fn test_instance_view_splits_private_addresses() {
        let view = flatten_instance_view(&snapshot().instance);
        assert_eq!(view.ip_address.as_deref(), Some("203.0.113.5"));
        assert_eq!(view.private_ip_address.as_deref(), Some("192.168.1.9"));
        assert_eq!(view.ipv4, vec!["203.0.113.5"]);
    }

    #[test]
    fn test_parse_instance_id() {
        assert_eq!(parse_instance_id(" 42 ").unwrap(), 42);
        assert!(parse_instance_id("abc").is_err());
        assert!(parse_instance_id("0").is_err());
    }
}
