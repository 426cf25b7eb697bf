//! Instance, disk, config, networking and event endpoints.

use serde_json::json;
use tracing::{debug, info};

use crate::error::Result;

use super::client::ApiSession;
use super::types::{
    BootRequest, ConfigRequest, Disk, DiskCreateRequest, DiskResizeRequest, Event, Instance,
    InstanceConfig, InstanceCreateRequest, InstanceIpAddresses, InstanceResizeRequest,
    InstanceUpdateRequest, IpAddress, IpAllocateRequest, LinodeType, Volume,
};

fn instance_path(id: u64) -> String {
    format!("/linode/instances/{id}")
}

impl ApiSession<'_> {
    /// Fetches an instance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the instance is gone.
    pub async fn get_instance(&self, id: u64) -> Result<Instance> {
        self.get(&instance_path(id)).await
    }

    /// Lists instances, optionally filtered server side.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_instances(&self, filter: Option<&str>) -> Result<Vec<Instance>> {
        self.list("/linode/instances", filter).await
    }

    /// Creates an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn create_instance(&self, request: &InstanceCreateRequest) -> Result<Instance> {
        info!(
            "Creating instance '{}' ({} in {})",
            request.label, request.plan_type, request.region
        );
        self.post("/linode/instances", request).await
    }

    /// Updates mutable instance fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn update_instance(&self, id: u64, request: &InstanceUpdateRequest) -> Result<Instance> {
        debug!("Updating instance {id}");
        self.put(&instance_path(id), request).await
    }

    /// Deletes an instance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it is already gone.
    pub async fn delete_instance(&self, id: u64) -> Result<()> {
        info!("Deleting instance {id}");
        self.delete(&instance_path(id)).await
    }

    /// Boots an instance, optionally into a specific config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn boot_instance(&self, id: u64, config_id: Option<u64>) -> Result<()> {
        info!("Booting instance {id}");
        self.post_action(&format!("{}/boot", instance_path(id)), &BootRequest { config_id })
            .await
    }

    /// Reboots an instance, optionally into a specific config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn reboot_instance(&self, id: u64, config_id: Option<u64>) -> Result<()> {
        info!("Rebooting instance {id}");
        self.post_action(&format!("{}/reboot", instance_path(id)), &BootRequest { config_id })
            .await
    }

    /// Shuts an instance down.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn shutdown_instance(&self, id: u64) -> Result<()> {
        info!("Shutting down instance {id}");
        self.post_action(&format!("{}/shutdown", instance_path(id)), &json!({}))
            .await
    }

    /// Resizes an instance to a new plan type.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn resize_instance(&self, id: u64, request: &InstanceResizeRequest) -> Result<()> {
        info!("Resizing instance {id} to {}", request.plan_type);
        self.post_action(&format!("{}/resize", instance_path(id)), request)
            .await
    }

    /// Lists the disks of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_disks(&self, id: u64) -> Result<Vec<Disk>> {
        self.list(&format!("{}/disks", instance_path(id)), None).await
    }

    /// Fetches one disk.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the disk is gone.
    pub async fn get_disk(&self, id: u64, disk_id: u64) -> Result<Disk> {
        self.get(&format!("{}/disks/{disk_id}", instance_path(id))).await
    }

    /// Creates a disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn create_disk(&self, id: u64, request: &DiskCreateRequest) -> Result<Disk> {
        info!("Creating disk '{}' ({} MB) on instance {id}", request.label, request.size);
        self.post(&format!("{}/disks", instance_path(id)), request).await
    }

    /// Resizes a disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn resize_disk(&self, id: u64, disk_id: u64, size: u64) -> Result<()> {
        info!("Resizing disk {disk_id} on instance {id} to {size} MB");
        self.post_action(
            &format!("{}/disks/{disk_id}/resize", instance_path(id)),
            &DiskResizeRequest { size },
        )
        .await
    }

    /// Deletes a disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn delete_disk(&self, id: u64, disk_id: u64) -> Result<()> {
        info!("Deleting disk {disk_id} on instance {id}");
        self.delete(&format!("{}/disks/{disk_id}", instance_path(id))).await
    }

    /// Lists the configs of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_configs(&self, id: u64) -> Result<Vec<InstanceConfig>> {
        self.list(&format!("{}/configs", instance_path(id)), None).await
    }

    /// Creates a config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn create_config(&self, id: u64, request: &ConfigRequest) -> Result<InstanceConfig> {
        info!("Creating config '{}' on instance {id}", request.label);
        self.post(&format!("{}/configs", instance_path(id)), request).await
    }

    /// Replaces a config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn update_config(
        &self,
        id: u64,
        config_id: u64,
        request: &ConfigRequest,
    ) -> Result<InstanceConfig> {
        info!("Updating config {config_id} on instance {id}");
        self.put(&format!("{}/configs/{config_id}", instance_path(id)), request)
            .await
    }

    /// Deletes a config.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn delete_config(&self, id: u64, config_id: u64) -> Result<()> {
        info!("Deleting config {config_id} on instance {id}");
        self.delete(&format!("{}/configs/{config_id}", instance_path(id)))
            .await
    }

    /// Fetches every address of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn get_ip_addresses(&self, id: u64) -> Result<InstanceIpAddresses> {
        self.get(&format!("{}/ips", instance_path(id))).await
    }

    /// Allocates an additional IPv4 address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn allocate_ipv4(&self, id: u64, public: bool) -> Result<IpAddress> {
        info!(
            "Allocating {} IPv4 on instance {id}",
            if public { "public" } else { "private" }
        );
        self.post(&format!("{}/ips", instance_path(id)), &IpAllocateRequest::ipv4(public))
            .await
    }

    /// Releases an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn release_ip(&self, id: u64, address: &str) -> Result<()> {
        info!("Releasing {address} from instance {id}");
        self.delete(&format!("{}/ips/{address}", instance_path(id))).await
    }

    /// Enrolls an instance in the backup service.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn enable_backups(&self, id: u64) -> Result<()> {
        info!("Enabling backups on instance {id}");
        self.post_action(&format!("{}/backups/enable", instance_path(id)), &json!({}))
            .await
    }

    /// Cancels the backup service.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn cancel_backups(&self, id: u64) -> Result<()> {
        info!("Cancelling backups on instance {id}");
        self.post_action(&format!("{}/backups/cancel", instance_path(id)), &json!({}))
            .await
    }

    /// Fetches a plan type from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown types.
    pub async fn get_type(&self, type_id: &str) -> Result<LinodeType> {
        self.get(&format!("/linode/types/{type_id}")).await
    }

    /// Fetches a block storage volume.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the volume is gone.
    pub async fn get_volume(&self, volume_id: u64) -> Result<Volume> {
        self.get(&format!("/volumes/{volume_id}")).await
    }

    /// Detaches a volume from whatever instance holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the request.
    pub async fn detach_volume(&self, volume_id: u64) -> Result<()> {
        info!("Detaching volume {volume_id}");
        self.post_action(&format!("/volumes/{volume_id}/detach"), &json!({}))
            .await
    }

    /// Lists account events matching a filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_events(&self, filter: &str) -> Result<Vec<Event>> {
        self.list("/account/events", Some(filter)).await
    }
}
