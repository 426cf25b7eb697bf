//! Linode API v4 types.
//!
//! Request and response shapes for the endpoints the provider uses. Response
//! structs default every optional field so partial payloads still decode.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// One-based page number.
    #[serde(default)]
    pub page: u32,
    /// Total number of pages.
    #[serde(default)]
    pub pages: u32,
    /// Total number of results.
    #[serde(default)]
    pub results: u32,
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// Instance status as reported by the API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Being allocated.
    Provisioning,
    /// Booting.
    Booting,
    /// Running.
    Running,
    /// Powered off.
    Offline,
    /// Shutting down.
    ShuttingDown,
    /// Rebooting.
    Rebooting,
    /// Migrating between hosts.
    Migrating,
    /// Being rebuilt.
    Rebuilding,
    /// Being cloned.
    Cloning,
    /// Restoring from backup.
    Restoring,
    /// Being deleted.
    Deleting,
    /// Being resized.
    Resizing,
    /// Taking a backup.
    BackingUp,
    /// Anything the provider does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// True for states in which the instance is up or coming up.
    #[must_use]
    pub const fn is_booted(self) -> bool {
        matches!(self, Self::Running | Self::Booting | Self::Rebooting)
    }

    /// API spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Booting => "booting",
            Self::Running => "running",
            Self::Offline => "offline",
            Self::ShuttingDown => "shutting_down",
            Self::Rebooting => "rebooting",
            Self::Migrating => "migrating",
            Self::Rebuilding => "rebuilding",
            Self::Cloning => "cloning",
            Self::Restoring => "restoring",
            Self::Deleting => "deleting",
            Self::Resizing => "resizing",
            Self::BackingUp => "backing_up",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    /// Instance id.
    pub id: u64,
    /// Label.
    #[serde(default)]
    pub label: String,
    /// Display group.
    #[serde(default)]
    pub group: String,
    /// Current status.
    #[serde(default)]
    pub status: InstanceStatus,
    /// Plan type.
    #[serde(rename = "type", default)]
    pub plan_type: Option<String>,
    /// Region.
    #[serde(default)]
    pub region: String,
    /// Image the instance was deployed from.
    #[serde(default)]
    pub image: Option<String>,
    /// IPv4 addresses.
    #[serde(default)]
    pub ipv4: Vec<String>,
    /// IPv6 SLAAC address with prefix.
    #[serde(default)]
    pub ipv6: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Shutdown watchdog.
    #[serde(default)]
    pub watchdog_enabled: bool,
    /// Alert thresholds.
    #[serde(default)]
    pub alerts: InstanceAlerts,
    /// Resource specs.
    #[serde(default)]
    pub specs: InstanceSpecs,
    /// Backup service state.
    #[serde(default)]
    pub backups: InstanceBackups,
}

/// Alert thresholds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceAlerts {
    /// CPU percentage.
    #[serde(default)]
    pub cpu: u32,
    /// Inbound traffic in Mb/s.
    #[serde(default)]
    pub network_in: u32,
    /// Outbound traffic in Mb/s.
    #[serde(default)]
    pub network_out: u32,
    /// Transfer quota percentage.
    #[serde(default)]
    pub transfer_quota: u32,
    /// Disk IO operations per second.
    #[serde(default)]
    pub io: u32,
}

/// Resource specs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSpecs {
    /// Disk allowance in MB.
    #[serde(default)]
    pub disk: u64,
    /// Memory in MB.
    #[serde(default)]
    pub memory: u64,
    /// Virtual CPUs.
    #[serde(default)]
    pub vcpus: u32,
    /// Monthly transfer in MB.
    #[serde(default)]
    pub transfer: u64,
}

/// Backup service state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceBackups {
    /// Whether backups are enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Preferred schedule.
    #[serde(default)]
    pub schedule: BackupSchedule,
}

/// Preferred backup window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupSchedule {
    /// Day of week, or `Scheduling`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    /// Two-hour window `W0`..`W22`, or `Scheduling`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
}

/// Network interface purpose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterfacePurpose {
    /// Public internet.
    #[default]
    Public,
    /// Private VLAN.
    Vlan,
}

/// A network interface on a config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigInterface {
    /// Purpose.
    pub purpose: InterfacePurpose,
    /// VLAN label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// VLAN address in CIDR notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_address: Option<String>,
}

/// Create request for an instance.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct InstanceCreateRequest {
    /// Region.
    pub region: String,
    /// Plan type.
    #[serde(rename = "type")]
    pub plan_type: String,
    /// Label.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// Display group.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Image.
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
    /// StackScript user-defined fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
    /// Backup to restore from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<u64>,
    /// Swap disk size in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_size: Option<u64>,
    /// Allocate a private IPv4.
    pub private_ip: bool,
    /// Enroll in the backup service.
    pub backups_enabled: bool,
    /// Boot after creation.
    pub booted: bool,
    /// Interfaces for the generated config.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<ConfigInterface>,
}

/// Update request for an instance. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct InstanceUpdateRequest {
    /// Label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Display group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Shutdown watchdog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchdog_enabled: Option<bool>,
    /// Alert thresholds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<InstanceAlerts>,
    /// Backup schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backups: Option<BackupsUpdate>,
}

impl InstanceUpdateRequest {
    /// True when nothing would be sent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.group.is_none()
            && self.tags.is_none()
            && self.watchdog_enabled.is_none()
            && self.alerts.is_none()
            && self.backups.is_none()
    }
}

/// Backup settings in an instance update.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BackupsUpdate {
    /// Preferred schedule.
    pub schedule: BackupSchedule,
}

/// Migration strategy for a resize.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MigrationType {
    /// Power off, migrate, leave offline.
    #[default]
    Cold,
    /// Live migration.
    Warm,
}

/// Resize request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceResizeRequest {
    /// Target plan type.
    #[serde(rename = "type")]
    pub plan_type: String,
    /// Let the API grow the disks itself.
    pub allow_auto_disk_resize: bool,
    /// Migration strategy.
    pub migration_type: MigrationType,
}

/// Boot or reboot request.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BootRequest {
    /// Config to boot; the API picks the last booted config when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<u64>,
}

/// A plan type from the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinodeType {
    /// Type id.
    pub id: String,
    /// Label.
    #[serde(default)]
    pub label: String,
    /// Disk allowance in MB.
    #[serde(default)]
    pub disk: u64,
    /// Memory in MB.
    #[serde(default)]
    pub memory: u64,
    /// Virtual CPUs.
    #[serde(default)]
    pub vcpus: u32,
    /// Monthly transfer in MB.
    #[serde(default)]
    pub transfer: u64,
    /// Plan class.
    #[serde(default)]
    pub class: String,
}

// ---------------------------------------------------------------------------
// Disks
// ---------------------------------------------------------------------------

/// Disk filesystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    /// Unformatted.
    Raw,
    /// Swap space.
    Swap,
    /// ext3.
    Ext3,
    /// ext4.
    #[default]
    Ext4,
    /// Initial ramdisk.
    Initrd,
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::Swap => "swap",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Initrd => "initrd",
        };
        f.write_str(name)
    }
}

/// Disk status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DiskStatus {
    /// Usable.
    #[serde(rename = "ready")]
    Ready,
    /// Being created or resized.
    #[serde(rename = "not ready")]
    NotReady,
    /// Being deleted.
    #[serde(rename = "deleting")]
    Deleting,
    /// Anything else.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::NotReady => "not ready",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A disk attached to an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disk {
    /// Disk id.
    pub id: u64,
    /// Label.
    #[serde(default)]
    pub label: String,
    /// Status.
    #[serde(default)]
    pub status: DiskStatus,
    /// Size in MB.
    #[serde(default)]
    pub size: u64,
    /// Filesystem.
    #[serde(default)]
    pub filesystem: Filesystem,
}

/// Create request for a disk.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DiskCreateRequest {
    /// Label.
    pub label: String,
    /// Size in MB.
    pub size: u64,
    /// Filesystem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<Filesystem>,
    /// Image.
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
    /// StackScript user-defined fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
}

/// Disk resize request.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DiskResizeRequest {
    /// New size in MB.
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------------

/// A device slot in a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceSlot {
    /// `/dev/sda`.
    Sda,
    /// `/dev/sdb`.
    Sdb,
    /// `/dev/sdc`.
    Sdc,
    /// `/dev/sdd`.
    Sdd,
    /// `/dev/sde`.
    Sde,
    /// `/dev/sdf`.
    Sdf,
    /// `/dev/sdg`.
    Sdg,
    /// `/dev/sdh`.
    Sdh,
}

impl DeviceSlot {
    /// Every slot in order.
    pub const ALL: [Self; 8] = [
        Self::Sda,
        Self::Sdb,
        Self::Sdc,
        Self::Sdd,
        Self::Sde,
        Self::Sdf,
        Self::Sdg,
        Self::Sdh,
    ];

    /// Slot name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sda => "sda",
            Self::Sdb => "sdb",
            Self::Sdc => "sdc",
            Self::Sdd => "sdd",
            Self::Sde => "sde",
            Self::Sdf => "sdf",
            Self::Sdg => "sdg",
            Self::Sdh => "sdh",
        }
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a device slot points at.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDevice {
    /// Disk id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<u64>,
    /// Block storage volume id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<u64>,
}

/// Fixed-width device table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDeviceMap {
    /// Slot sda.
    #[serde(default)]
    pub sda: Option<ConfigDevice>,
    /// Slot sdb.
    #[serde(default)]
    pub sdb: Option<ConfigDevice>,
    /// Slot sdc.
    #[serde(default)]
    pub sdc: Option<ConfigDevice>,
    /// Slot sdd.
    #[serde(default)]
    pub sdd: Option<ConfigDevice>,
    /// Slot sde.
    #[serde(default)]
    pub sde: Option<ConfigDevice>,
    /// Slot sdf.
    #[serde(default)]
    pub sdf: Option<ConfigDevice>,
    /// Slot sdg.
    #[serde(default)]
    pub sdg: Option<ConfigDevice>,
    /// Slot sdh.
    #[serde(default)]
    pub sdh: Option<ConfigDevice>,
}

impl ConfigDeviceMap {
    /// Device in a slot. Empty devices count as unset.
    #[must_use]
    pub fn get(&self, slot: DeviceSlot) -> Option<ConfigDevice> {
        let device = match slot {
            DeviceSlot::Sda => self.sda,
            DeviceSlot::Sdb => self.sdb,
            DeviceSlot::Sdc => self.sdc,
            DeviceSlot::Sdd => self.sdd,
            DeviceSlot::Sde => self.sde,
            DeviceSlot::Sdf => self.sdf,
            DeviceSlot::Sdg => self.sdg,
            DeviceSlot::Sdh => self.sdh,
        };
        device.filter(|d| d.disk_id.is_some() || d.volume_id.is_some())
    }

    /// Sets a slot.
    pub const fn set(&mut self, slot: DeviceSlot, device: Option<ConfigDevice>) {
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

    /// Occupied slots in order.
    pub fn occupied(&self) -> impl Iterator<Item = (DeviceSlot, ConfigDevice)> + '_ {
        DeviceSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|device| (slot, device)))
    }
}

/// Config helper toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigHelpers {
    /// Disable updatedb.
    #[serde(default)]
    pub updatedb_disabled: bool,
    /// Distro helper.
    #[serde(default = "default_true")]
    pub distro: bool,
    /// modules.dep helper.
    #[serde(default = "default_true")]
    pub modules_dep: bool,
    /// Network helper.
    #[serde(default = "default_true")]
    pub network: bool,
    /// devtmpfs automount.
    #[serde(default)]
    pub devtmpfs_automount: bool,
}

impl Default for ConfigHelpers {
    fn default() -> Self {
        Self {
            updatedb_disabled: true,
            distro: true,
            modules_dep: true,
            network: true,
            devtmpfs_automount: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// A boot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Config id.
    pub id: u64,
    /// Label.
    #[serde(default)]
    pub label: String,
    /// Kernel id.
    #[serde(default)]
    pub kernel: String,
    /// Run level.
    #[serde(default)]
    pub run_level: String,
    /// Virtualization mode.
    #[serde(default)]
    pub virt_mode: String,
    /// Root device path.
    #[serde(default)]
    pub root_device: String,
    /// Comments.
    #[serde(default)]
    pub comments: String,
    /// Memory limit in MB, 0 for all.
    #[serde(default)]
    pub memory_limit: u64,
    /// Device table.
    #[serde(default)]
    pub devices: ConfigDeviceMap,
    /// Helpers.
    #[serde(default)]
    pub helpers: ConfigHelpers,
    /// Interfaces.
    #[serde(default)]
    pub interfaces: Vec<ConfigInterface>,
}

/// Create or update request for a config.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ConfigRequest {
    /// Label.
    pub label: String,
    /// Kernel id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    /// Run level.
    pub run_level: String,
    /// Virtualization mode.
    pub virt_mode: String,
    /// Root device path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_device: Option<String>,
    /// Comments.
    pub comments: String,
    /// Memory limit in MB.
    pub memory_limit: u64,
    /// Device table.
    pub devices: ConfigDeviceMap,
    /// Helpers.
    pub helpers: ConfigHelpers,
    /// Interfaces.
    pub interfaces: Vec<ConfigInterface>,
}

// ---------------------------------------------------------------------------
// Networking
// ---------------------------------------------------------------------------

/// One IP address.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpAddress {
    /// Address.
    pub address: String,
    /// Gateway.
    #[serde(default)]
    pub gateway: Option<String>,
    /// Prefix length.
    #[serde(default)]
    pub prefix: u32,
    /// Subnet mask.
    #[serde(default)]
    pub subnet_mask: String,
    /// Reverse DNS.
    #[serde(default)]
    pub rdns: Option<String>,
    /// Region.
    #[serde(default)]
    pub region: String,
    /// Address type, e.g. `ipv4`.
    #[serde(rename = "type", default)]
    pub address_type: String,
    /// Public flag.
    #[serde(default)]
    pub public: bool,
}

/// IPv4 addresses grouped by role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ipv4Addresses {
    /// Public addresses.
    #[serde(default)]
    pub public: Vec<IpAddress>,
    /// Private addresses.
    #[serde(default)]
    pub private: Vec<IpAddress>,
    /// Shared addresses.
    #[serde(default)]
    pub shared: Vec<IpAddress>,
    /// Reserved addresses.
    #[serde(default)]
    pub reserved: Vec<IpAddress>,
}

/// IPv6 addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ipv6Addresses {
    /// SLAAC address.
    #[serde(default)]
    pub slaac: Option<IpAddress>,
    /// Link-local address.
    #[serde(default)]
    pub link_local: Option<IpAddress>,
}

/// All addresses of an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceIpAddresses {
    /// IPv4.
    #[serde(default)]
    pub ipv4: Ipv4Addresses,
    /// IPv6.
    #[serde(default)]
    pub ipv6: Option<Ipv6Addresses>,
}

/// Allocation request for an additional IPv4.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IpAllocateRequest {
    /// Always `ipv4`.
    #[serde(rename = "type")]
    pub address_type: String,
    /// Public or private.
    pub public: bool,
}

impl IpAllocateRequest {
    /// IPv4 allocation.
    #[must_use]
    pub fn ipv4(public: bool) -> Self {
        Self {
            address_type: String::from("ipv4"),
            public,
        }
    }
}

/// A block storage volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// Volume id.
    pub id: u64,
    /// Label.
    #[serde(default)]
    pub label: String,
    /// Attached instance.
    #[serde(default)]
    pub linode_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Event status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Queued.
    Scheduled,
    /// In progress.
    Started,
    /// Completed successfully.
    Finished,
    /// Completed with an error.
    Failed,
    /// Informational only.
    Notification,
    /// Anything else.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Notification => "notification",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The entity an event refers to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEntity {
    /// Entity id.
    #[serde(default)]
    pub id: u64,
    /// Entity type, e.g. `linode` or `lkecluster`.
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// Entity label.
    #[serde(default)]
    pub label: String,
}

/// An entry in the account event feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event id.
    pub id: u64,
    /// Action, e.g. `linode_boot`.
    pub action: String,
    /// Creation time (UTC).
    #[serde(with = "api_time")]
    pub created: NaiveDateTime,
    /// Status.
    #[serde(default)]
    pub status: EventStatus,
    /// Primary entity.
    #[serde(default)]
    pub entity: Option<EventEntity>,
    /// Secondary entity, e.g. the disk of a `disk_create`.
    #[serde(default)]
    pub secondary_entity: Option<EventEntity>,
    /// Progress percentage.
    #[serde(default)]
    pub percent_complete: Option<u32>,
}

/// Timestamp format used by the API: UTC without an offset.
pub mod api_time {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    /// API timestamp format.
    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    /// Formats a timestamp the way the API expects it in filters.
    #[must_use]
    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    /// Parses an API timestamp, accepting RFC 3339 as well.
    ///
    /// # Errors
    ///
    /// Returns the parse error for unrecognized input.
    pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc()))
    }

    /// Serializes a timestamp.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    /// Deserializes a timestamp.
    ///
    /// # Errors
    ///
    /// Fails on unrecognized input.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// LKE
// ---------------------------------------------------------------------------

/// Cluster or node readiness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LkeStatus {
    /// Ready.
    Ready,
    /// Not ready.
    NotReady,
    /// Anything else.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for LkeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::NotReady => "not_ready",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Control plane settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeControlPlane {
    /// Highly available control plane.
    #[serde(default)]
    pub high_availability: bool,
}

/// An LKE cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeCluster {
    /// Cluster id.
    pub id: u64,
    /// Label.
    #[serde(default)]
    pub label: String,
    /// Region.
    #[serde(default)]
    pub region: String,
    /// Kubernetes version.
    #[serde(default)]
    pub k8s_version: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Status.
    #[serde(default)]
    pub status: LkeStatus,
    /// Control plane settings.
    #[serde(default)]
    pub control_plane: LkeControlPlane,
}

/// Autoscaler settings of a pool.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeAutoscaler {
    /// Enabled flag.
    pub enabled: bool,
    /// Minimum node count.
    pub min: u32,
    /// Maximum node count.
    pub max: u32,
}

/// A node in a pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeNode {
    /// Node id.
    pub id: String,
    /// Backing instance.
    #[serde(default)]
    pub instance_id: Option<u64>,
    /// Readiness.
    #[serde(default)]
    pub status: LkeStatus,
}

/// A node pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeNodePool {
    /// Pool id.
    pub id: u64,
    /// Node count.
    #[serde(default)]
    pub count: u32,
    /// Plan type of the nodes.
    #[serde(rename = "type", default)]
    pub plan_type: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Autoscaler.
    #[serde(default)]
    pub autoscaler: LkeAutoscaler,
    /// Nodes.
    #[serde(default)]
    pub nodes: Vec<LkeNode>,
}

/// Create request for a pool, also used inside cluster create.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LkeNodePoolCreateRequest {
    /// Node count.
    pub count: u32,
    /// Plan type.
    #[serde(rename = "type")]
    pub plan_type: String,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Autoscaler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaler: Option<LkeAutoscaler>,
}

/// Update request for a pool.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LkeNodePoolUpdateRequest {
    /// Node count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Autoscaler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaler: Option<LkeAutoscaler>,
}

/// Create request for a cluster.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LkeClusterCreateRequest {
    /// Label.
    pub label: String,
    /// Region.
    pub region: String,
    /// Kubernetes version.
    pub k8s_version: String,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Initial pools.
    pub node_pools: Vec<LkeNodePoolCreateRequest>,
    /// Control plane settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<LkeControlPlane>,
}

/// Update request for a cluster.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LkeClusterUpdateRequest {
    /// Label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Control plane settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<LkeControlPlane>,
}

impl LkeClusterUpdateRequest {
    /// True when nothing would be sent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.label.is_none() && self.tags.is_none() && self.control_plane.is_none()
    }
}

/// Kubeconfig payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeKubeconfig {
    /// Base64 kubeconfig.
    #[serde(default)]
    pub kubeconfig: String,
}

/// One API endpoint of a cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LkeApiEndpoint {
    /// Endpoint URL.
    pub endpoint: String,
}
