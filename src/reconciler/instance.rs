//! Compute instance reconciliation.
//!
//! Create follows one of two paths. The simple path sends a single create
//! request and lets the API build disks and configs from the image. The
//! composite path allocates a bare instance, then creates disks, configs and
//! addresses in order before booting the chosen config.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::{ApiError, ProviderError, Result, WaitError};
use crate::flatten::{
    ConfigModel, ExtraIpModel, InstanceModel, InstanceSnapshot, expand_config_request, expand_create_request,
    expand_disk_request, flatten_instance, parse_instance_id,
};
use crate::linode::ApiSession;
use crate::linode::EventToken;
use crate::linode::types::{InstanceResizeRequest, InstanceStatus, IpAddress};
use crate::planner::{
    InstanceUpdatePlan, PowerAction, ResizeStep, TypeChange, plan_instance_update,
    validate_instance,
};

use super::{PartialFailure, Reconciled};

const ENTITY: &str = "linode";

/// Generates a 64 character root password: 48 random bytes, base64 encoded.
#[must_use]
pub fn random_root_password() -> String {
    let raw: Vec<u8> = (0..3).flat_map(|_| Uuid::new_v4().into_bytes()).collect();
    STANDARD.encode(raw)
}

/// Copies freshly allocated addresses onto the declared extras that have
/// none, so the read-back can find them.
fn with_extra_addresses(desired: &InstanceModel, allocated: &[IpAddress]) -> InstanceModel {
    let mut recorded = desired.clone();
    let mut fresh = allocated.iter().collect::<Vec<_>>();
    for extra in recorded.extra_ip.iter_mut().filter(|e| e.address.is_none()) {
        if let Some(pos) = fresh.iter().position(|ip| ip.public == extra.public) {
            *extra = ExtraIpModel::from(fresh.remove(pos));
        }
    }
    recorded
}

/// Reconciler for one `linode_instance` operation.
#[derive(Debug, Clone, Copy)]
pub struct InstanceReconciler<'a> {
    session: ApiSession<'a>,
    config: &'a ProviderConfig,
}

impl<'a> InstanceReconciler<'a> {
    /// Creates a reconciler bound to an operation session.
    #[must_use]
    pub const fn new(session: ApiSession<'a>, config: &'a ProviderConfig) -> Self {
        Self { session, config }
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Creates the instance and returns its observed state.
    ///
    /// # Errors
    ///
    /// Fails before any write for invalid models. Failures after the instance
    /// exists carry the state read back at that point.
    pub async fn create(&self, desired: &InstanceModel) -> Reconciled<InstanceModel> {
        validate_instance(desired)?;

        let simple = !desired.is_explicit();
        let request = expand_create_request(desired);
        let mut token = EventToken::unbound(ENTITY, "linode_create");
        let instance = self.session.create_instance(&request).await?;
        let id = instance.id;
        token.bind(id);
        info!(
            "Instance {id} allocated ({} path)",
            if simple { "simple" } else { "composite" }
        );

        let assembled = if simple {
            self.finish_simple(id, desired).await
        } else {
            self.assemble(id, desired, &token).await
        };

        match assembled {
            Ok(allocated) => match self.read(id, &with_extra_addresses(desired, &allocated)).await {
                Ok(Some(model)) => Ok(model),
                Ok(None) => Err(PartialFailure::new(
                    ApiError::NotFound {
                        path: format!("/linode/instances/{id}"),
                    }
                    .into(),
                    None,
                )),
                Err(error) => Err(self.partial(id, desired, error).await),
            },
            Err(error) => Err(self.partial(id, desired, error).await),
        }
    }

    async fn finish_simple(&self, id: u64, desired: &InstanceModel) -> Result<Vec<IpAddress>> {
        self.apply_post_create_settings(id, desired).await?;
        let allocated = self.allocate_extra_ips(id, desired.extra_ip.iter().map(|ip| ip.public).collect::<Vec<bool>>()).await?;
        if self.config.skip_instance_ready_poll {
            debug!("Skipping ready poll for instance {id}");
            return Ok(allocated);
        }
        let target = if desired.booted.unwrap_or(true) {
            InstanceStatus::Running
        } else {
            InstanceStatus::Offline
        };
        self.session
            .wait_for_instance_status(id, target, self.config.event_poll_interval())
            .await?;
        Ok(allocated)
    }

    async fn allocate_extra_ips(
        &self,
        id: u64,
        kinds: impl IntoIterator<Item = bool>,
    ) -> Result<Vec<IpAddress>> {
        let mut allocated = Vec::new();
        for public in kinds {
            allocated.push(self.session.allocate_ipv4(id, public).await?);
        }
        Ok(allocated)
    }

    /// Composite create: disks, configs, addresses, then boot.
    async fn assemble(
        &self,
        id: u64,
        desired: &InstanceModel,
        created: &EventToken,
    ) -> Result<Vec<IpAddress>> {
        let interval = self.config.event_poll_interval();
        if !self.config.skip_instance_ready_poll {
            self.session.wait_for_event(created, interval).await?;
        }
        self.apply_post_create_settings(id, desired).await?;

        let mut disk_ids = HashMap::new();
        for disk in &desired.disk {
            let mut request = expand_disk_request(disk);
            if disk.needs_generated_password() {
                debug!("Generating root password for disk '{}'", disk.label);
                request.root_pass = Some(random_root_password());
            }
            let token = EventToken::capture(ENTITY, id, "disk_create");
            let created = self.session.create_disk(id, &request).await?;
            self.session
                .wait_for_event(&token.with_secondary(created.id), interval)
                .await?;
            disk_ids.insert(disk.label.clone(), created.id);
        }

        let mut config_ids = HashMap::new();
        for config in &desired.config {
            self.detach_foreign_volumes(id, config).await?;
            let request = expand_config_request(config, &disk_ids, None)?;
            let created = self.session.create_config(id, &request).await?;
            config_ids.insert(config.label.clone(), created.id);
        }

        if desired.private_ip {
            self.session.allocate_ipv4(id, false).await?;
        }
        let allocated = self.allocate_extra_ips(id, desired.extra_ip.iter().map(|ip| ip.public).collect::<Vec<bool>>()).await?;

        if desired.booted == Some(false) {
            info!("Instance {id} assembled, left offline");
            return Ok(allocated);
        }
        let Some(boot) = desired.boot_config()? else {
            warn!("Instance {id} has no config to boot");
            return Ok(allocated);
        };
        let config_id = config_ids.get(&boot.label).copied();
        self.session.boot_instance(id, config_id).await?;
        if !self.config.skip_instance_ready_poll {
            self.session
                .wait_for_instance_status(id, InstanceStatus::Running, interval)
                .await?;
        }
        info!("Instance {id} booted into '{}'", boot.label);
        Ok(allocated)
    }

    /// Settings the create endpoint does not take.
    async fn apply_post_create_settings(&self, id: u64, desired: &InstanceModel) -> Result<()> {
        let request = crate::linode::types::InstanceUpdateRequest {
            watchdog_enabled: (!desired.watchdog_enabled).then_some(false),
            alerts: desired.alerts,
            ..Default::default()
        };
        if !request.is_empty() {
            self.session.update_instance(id, &request).await?;
        }
        Ok(())
    }

    /// Detaches volumes named by a config that another instance holds.
    async fn detach_foreign_volumes(&self, id: u64, config: &ConfigModel) -> Result<()> {
        let Some(devices) = &config.devices else {
            return Ok(());
        };
        for (slot, device) in devices.slots() {
            let Some(volume_id) = device.volume_id else {
                continue;
            };
            let volume = self.session.get_volume(volume_id).await?;
            if volume.linode_id.is_some_and(|holder| holder != id) {
                info!("Volume {volume_id} for {slot} is attached elsewhere, detaching");
                self.session.detach_volume(volume_id).await?;
                self.session
                    .wait_for_volume_detached(volume_id, self.config.event_poll_interval())
                    .await?;
            }
        }
        Ok(())
    }

    async fn partial(
        &self,
        id: u64,
        desired: &InstanceModel,
        error: ProviderError,
    ) -> PartialFailure<InstanceModel> {
        warn!("Instance {id} operation failed: {error}");
        let partial = match self.read(id, desired).await {
            Ok(model) => model,
            Err(read_error) => {
                debug!("Partial read of instance {id} failed: {read_error}");
                Some(InstanceModel {
                    id: Some(id.to_string()),
                    ..desired.clone()
                })
            }
        };
        PartialFailure::new(error, partial)
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Reads the instance; `None` when it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns API errors other than 404 on the instance itself.
    pub async fn read(&self, id: u64, prior: &InstanceModel) -> Result<Option<InstanceModel>> {
        let instance = match self.session.get_instance(id).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                info!("Instance {id} is gone");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (disks, configs, ips) = tokio::try_join!(
            self.session.list_disks(id),
            self.session.list_configs(id),
            self.session.get_ip_addresses(id),
        )?;

        let snapshot = InstanceSnapshot {
            instance,
            disks,
            configs,
            ips,
        };
        Ok(Some(flatten_instance(&snapshot, prior)))
    }

    /// Imports an instance by id.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for a malformed id and `NotFound` when no instance
    /// has it.
    pub async fn import(&self, raw_id: &str) -> Result<InstanceModel> {
        let id = parse_instance_id(raw_id)?;
        info!("Importing instance {id}");
        self.read(id, &InstanceModel::default())
            .await?
            .ok_or_else(|| {
                ApiError::NotFound {
                    path: format!("/linode/instances/{id}"),
                }
                .into()
            })
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Applies the changes between `prior` and `desired`.
    ///
    /// # Errors
    ///
    /// Plan errors abort before any write. Later failures carry the state
    /// read back after the failure.
    pub async fn update(&self, prior: &InstanceModel, desired: &InstanceModel) -> Reconciled<InstanceModel> {
        let id = prior.instance_id()?;

        let type_change = if prior.plan_type == desired.plan_type {
            None
        } else {
            let (from, to) = tokio::try_join!(
                self.session.get_type(&prior.plan_type),
                self.session.get_type(&desired.plan_type),
            )?;
            Some(TypeChange {
                from_disk_mb: from.disk,
                to_disk_mb: to.disk,
            })
        };

        let plan = plan_instance_update(prior, desired, type_change, self.config.skip_implicit_reboots)?;
        if plan.is_noop() {
            debug!("Instance {id} is up to date");
            return Ok(desired.clone());
        }

        let allocated = match self.apply(id, prior, desired, &plan).await {
            Ok(allocated) => allocated,
            Err(error) => return Err(self.partial(id, desired, error).await),
        };
        match self.read(id, &with_extra_addresses(desired, &allocated)).await {
            Ok(Some(model)) => Ok(model),
            Ok(None) => Err(PartialFailure::new(
                ApiError::NotFound {
                    path: format!("/linode/instances/{id}"),
                }
                .into(),
                None,
            )),
            Err(error) => Err(PartialFailure::new(error, Some(desired.clone()))),
        }
    }

    async fn apply(
        &self,
        id: u64,
        prior: &InstanceModel,
        desired: &InstanceModel,
        plan: &InstanceUpdatePlan,
    ) -> Result<Vec<IpAddress>> {
        let interval = self.config.event_poll_interval();

        if let Some(request) = &plan.simple {
            self.session.update_instance(id, request).await?;
        }

        if plan.needs_offline && prior.booted.unwrap_or(true) {
            self.shutdown(id).await?;
        }

        if let Some(step) = plan.upsize() {
            self.resize(id, step).await?;
        }

        if plan.allocate_private_ip {
            self.session.allocate_ipv4(id, false).await?;
        }

        match plan.backups {
            Some(true) => self.session.enable_backups(id).await?,
            Some(false) => self.session.cancel_backups(id).await?,
            None => {}
        }

        let mut disk_ids: HashMap<String, u64> = prior
            .disk
            .iter()
            .filter_map(|d| d.id.map(|disk_id| (d.label.clone(), disk_id)))
            .collect();
        for (disk_id, label) in &plan.disks.delete {
            let token = EventToken::capture(ENTITY, id, "disk_delete").with_secondary(*disk_id);
            self.session.delete_disk(id, *disk_id).await?;
            self.session.wait_for_event(&token, interval).await?;
            disk_ids.remove(label);
        }
        for resize in &plan.disks.resize {
            self.resize_disk(id, resize.disk_id, resize.size).await?;
        }
        for disk in &plan.disks.create {
            let mut request = expand_disk_request(disk);
            if disk.needs_generated_password() {
                request.root_pass = Some(random_root_password());
            }
            let token = EventToken::capture(ENTITY, id, "disk_create");
            let created = self.session.create_disk(id, &request).await?;
            self.session
                .wait_for_event(&token.with_secondary(created.id), interval)
                .await?;
            disk_ids.insert(disk.label.clone(), created.id);
        }

        let mut config_ids: HashMap<String, u64> = prior
            .config
            .iter()
            .filter_map(|c| c.id.map(|config_id| (c.label.clone(), config_id)))
            .collect();
        for (config_id, label) in &plan.configs.delete {
            self.session.delete_config(id, *config_id).await?;
            config_ids.remove(label);
        }
        for (config_id, config) in &plan.configs.update {
            self.detach_foreign_volumes(id, config).await?;
            let request = expand_config_request(config, &disk_ids, None)?;
            self.session.update_config(id, *config_id, &request).await?;
        }
        for config in &plan.configs.create {
            self.detach_foreign_volumes(id, config).await?;
            let request = expand_config_request(config, &disk_ids, None)?;
            let created = self.session.create_config(id, &request).await?;
            config_ids.insert(config.label.clone(), created.id);
        }

        if let Some(step) = plan.downsize() {
            self.resize(id, step).await?;
        }

        for address in &plan.extra_ips.release {
            self.session.release_ip(id, address).await?;
        }
        let allocated = self
            .allocate_extra_ips(id, plan.extra_ips.allocate.iter().copied())
            .await?;

        let boot_config_id = plan
            .boot_config_label
            .as_ref()
            .and_then(|label| config_ids.get(label))
            .copied();

        if let Some(interfaces) = &plan.interfaces {
            let (Some(label), Some(config_id)) = (plan.boot_config_label.as_ref(), boot_config_id) else {
                return Err(ProviderError::Plan(crate::error::PlanError::Invalid {
                    path: String::from("interface"),
                    message: String::from("interfaces need a boot config to attach to"),
                }));
            };
            let mut config = desired
                .config
                .iter()
                .find(|c| c.label == *label)
                .cloned()
                .unwrap_or_default();
            config.interface.clone_from(interfaces);
            let request = expand_config_request(&config, &disk_ids, None)?;
            self.session.update_config(id, config_id, &request).await?;
        }

        match plan.power {
            PowerAction::Keep => {
                if !plan.reasons.is_empty() {
                    debug!("Instance {id}: no restart needed for {:?}", plan.reasons);
                }
            }
            PowerAction::Boot => {
                self.session.boot_instance(id, boot_config_id).await?;
                if !self.config.skip_instance_ready_poll {
                    self.session
                        .wait_for_instance_status(id, InstanceStatus::Running, interval)
                        .await?;
                }
            }
            PowerAction::Reboot => {
                info!("Rebooting instance {id} for {:?}", plan.reasons);
                let token = EventToken::capture(ENTITY, id, "linode_reboot");
                self.session.reboot_instance(id, boot_config_id).await?;
                if !self.config.skip_instance_ready_poll {
                    self.session.wait_for_event(&token, interval).await?;
                }
            }
            PowerAction::Shutdown => self.shutdown(id).await?,
        }
        Ok(allocated)
    }

    async fn shutdown(&self, id: u64) -> Result<()> {
        self.session.shutdown_instance(id).await?;
        self.session
            .wait_for_instance_status(id, InstanceStatus::Offline, self.config.event_poll_interval())
            .await?;
        Ok(())
    }

    async fn resize(&self, id: u64, step: &ResizeStep) -> Result<()> {
        let interval = self.config.event_poll_interval();
        let token = EventToken::capture(ENTITY, id, "linode_resize");
        let request = InstanceResizeRequest {
            plan_type: step.plan_type.clone(),
            allow_auto_disk_resize: false,
            migration_type: step.migration_type,
        };
        self.session.resize_instance(id, &request).await?;
        self.session.wait_for_event(&token, interval).await?;

        if let Some(expand) = &step.expand {
            info!(
                "Expanding disk '{}' on instance {id} to {} MB",
                expand.label, expand.size
            );
            self.resize_disk(id, expand.disk_id, expand.size).await?;
        }
        Ok(())
    }

    /// Resizes a disk and waits until it is ready at the new size.
    async fn resize_disk(&self, id: u64, disk_id: u64, size: u64) -> Result<()> {
        let interval = self.config.event_poll_interval();
        let token = EventToken::capture(ENTITY, id, "disk_resize").with_secondary(disk_id);
        self.session.resize_disk(id, disk_id, size).await?;
        self.session.wait_for_event(&token, interval).await?;

        let disk = self.session.wait_for_disk_ready(id, disk_id, interval).await?;
        if disk.size != size {
            return Err(WaitError::DiskSizeMismatch {
                instance_id: id,
                disk_id,
                expected: size,
                actual: disk.size,
            }
            .into());
        }
        debug!("Disk {disk_id} on instance {id} is ready at {size} MB");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Deletes the instance. A missing instance counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns API errors other than 404, or a poll failure.
    pub async fn delete(&self, prior: &InstanceModel) -> Result<()> {
        let id = prior.instance_id()?;
        let token = EventToken::capture(ENTITY, id, "linode_delete");
        match self.session.delete_instance(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("Instance {id} was already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        if !self.config.skip_instance_delete_poll {
            self.session
                .wait_for_event(&token, self.config.event_poll_interval())
                .await?;
        }
        info!("Instance {id} deleted");
        Ok(())
    }
}
