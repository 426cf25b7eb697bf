//! Event and status poller.
//!
//! Long-running transitions are observed either through the account event
//! feed ([`ApiSession::wait_for_event`]) or by re-reading an entity until it
//! reaches a status ([`wait_until`]). Both loops sleep through the
//! operation context, so the deadline and cancellation are enforced in one
//! place.

use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Result, WaitError};
use crate::provider::OperationContext;

use super::client::ApiSession;
use super::types::{Disk, DiskStatus, Event, EventStatus, Instance, InstanceStatus, api_time};

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The condition holds.
    Ready(T),
    /// Keep polling; the string describes what was observed.
    Pending(String),
}

/// Polls `probe` every `interval` until it reports ready.
///
/// # Errors
///
/// Propagates probe errors, and fails with `Timeout` or `Cancelled` through
/// the context. A timeout reports the last observed state.
pub async fn wait_until<T, F, Fut>(
    ctx: &OperationContext,
    interval: Duration,
    condition: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let mut polls = 0_u32;
    loop {
        ctx.ensure_active(condition)?;
        polls += 1;
        match probe().await? {
            Probe::Ready(value) => {
                debug!("{condition}: satisfied after {polls} poll(s)");
                return Ok(value);
            }
            Probe::Pending(observed) => {
                debug!("{condition}: poll {polls} observed {observed}");
                ctx.sleep(interval, condition, &observed).await?;
            }
        }
    }
}

/// Identifies the event an operation waits for.
///
/// The token is captured before the triggering request so that events
/// from earlier or concurrent operations on the same entity are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventToken {
    entity_type: String,
    entity_id: Option<u64>,
    action: String,
    secondary_entity_id: Option<u64>,
    created_after: NaiveDateTime,
}

impl EventToken {
    /// Captures a token for an existing entity at the current time.
    #[must_use]
    pub fn capture(entity_type: &str, entity_id: u64, action: &str) -> Self {
        let mut token = Self::unbound(entity_type, action);
        token.entity_id = Some(entity_id);
        token
    }

    /// Captures a token for an entity whose id is not known yet.
    #[must_use]
    pub fn unbound(entity_type: &str, action: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: None,
            action: action.to_string(),
            secondary_entity_id: None,
            created_after: Utc::now().naive_utc().trunc_subsecs(0),
        }
    }

    /// Overrides the capture time.
    #[must_use]
    pub const fn at(mut self, created_after: NaiveDateTime) -> Self {
        self.created_after = created_after;
        self
    }

    /// Narrows the token to events whose secondary entity has this id.
    #[must_use]
    pub const fn with_secondary(mut self, id: u64) -> Self {
        self.secondary_entity_id = Some(id);
        self
    }

    /// Binds the entity id once the create response is known.
    pub const fn bind(&mut self, entity_id: u64) {
        self.entity_id = Some(entity_id);
    }

    /// Awaited action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Earliest accepted creation time.
    #[must_use]
    pub const fn created_after(&self) -> NaiveDateTime {
        self.created_after
    }

    /// Server-side filter for the event feed.
    #[must_use]
    pub fn filter(&self) -> Value {
        let mut filter = json!({
            "entity.type": self.entity_type,
            "action": self.action,
            "created": { "+gte": api_time::format(&self.created_after) },
            "+order_by": "created",
            "+order": "asc",
        });
        if let (Some(id), Some(map)) = (self.entity_id, filter.as_object_mut()) {
            map.insert("entity.id".to_string(), json!(id));
        }
        filter
    }

    /// True if `event` was caused by the operation this token belongs to.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        let Some(entity) = &event.entity else {
            return false;
        };
        let secondary_ok = self.secondary_entity_id.is_none_or(|id| {
            event
                .secondary_entity
                .as_ref()
                .is_some_and(|secondary| secondary.id == id)
        });
        event.action == self.action
            && entity.entity_type == self.entity_type
            && self.entity_id.is_none_or(|id| entity.id == id)
            && event.created >= self.created_after
            && secondary_ok
    }

    /// Earliest matching event, ordered by creation time then id.
    #[must_use]
    pub fn select<'e>(&self, events: &'e [Event]) -> Option<&'e Event> {
        events
            .iter()
            .filter(|event| self.matches(event))
            .min_by_key(|event| (event.created, event.id))
    }

    fn describe(&self) -> String {
        match self.entity_id {
            Some(id) => format!("{} {id}", self.entity_type),
            None => self.entity_type.clone(),
        }
    }
}

impl ApiSession<'_> {
    /// Waits for the event identified by `token` to finish.
    ///
    /// # Errors
    ///
    /// Returns `EventFailed` if the event fails, or a timeout/cancellation.
    pub async fn wait_for_event(&self, token: &EventToken, interval: Duration) -> Result<Event> {
        let filter = token.filter().to_string();
        let condition = format!("event {} on {}", token.action, token.describe());

        wait_until(self.context(), interval, &condition, || {
            let filter = filter.as_str();
            async move {
                let events = self.list_events(filter).await?;
                let Some(event) = token.select(&events) else {
                    return Ok(Probe::Pending(String::from("no matching event yet")));
                };
                match event.status {
                    EventStatus::Finished => Ok(Probe::Ready(event.clone())),
                    EventStatus::Failed => Err(WaitError::EventFailed {
                        event_id: event.id,
                        action: event.action.clone(),
                        entity: token.describe(),
                    }
                    .into()),
                    status => Ok(Probe::Pending(format!("event {} {status}", event.id))),
                }
            }
        })
        .await
    }

    /// Waits for an instance to reach `target`.
    ///
    /// Every other status is treated as transitional.
    ///
    /// # Errors
    ///
    /// Returns a timeout/cancellation or the API error of a poll.
    pub async fn wait_for_instance_status(
        &self,
        id: u64,
        target: InstanceStatus,
        interval: Duration,
    ) -> Result<Instance> {
        let condition = format!("instance {id} to be {target}");
        wait_until(self.context(), interval, &condition, || async move {
            let instance = self.get_instance(id).await?;
            if instance.status == target {
                Ok(Probe::Ready(instance))
            } else {
                Ok(Probe::Pending(instance.status.to_string()))
            }
        })
        .await
    }

    /// Waits for a disk to become ready and returns it.
    ///
    /// # Errors
    ///
    /// Returns `TerminalStatus` if the disk starts deleting, or a
    /// timeout/cancellation.
    pub async fn wait_for_disk_ready(&self, id: u64, disk_id: u64, interval: Duration) -> Result<Disk> {
        let condition = format!("disk {disk_id} on instance {id} to be ready");
        wait_until(self.context(), interval, &condition, || async move {
            let disk = self.get_disk(id, disk_id).await?;
            match disk.status {
                DiskStatus::Ready => Ok(Probe::Ready(disk)),
                DiskStatus::Deleting => Err(WaitError::TerminalStatus {
                    entity: format!("disk {disk_id}"),
                    status: disk.status.to_string(),
                    target: DiskStatus::Ready.to_string(),
                }
                .into()),
                status => Ok(Probe::Pending(status.to_string())),
            }
        })
        .await
    }

    /// Waits for a volume to be detached from every instance.
    ///
    /// # Errors
    ///
    /// Returns a timeout/cancellation or the API error of a poll.
    pub async fn wait_for_volume_detached(&self, volume_id: u64, interval: Duration) -> Result<()> {
        let condition = format!("volume {volume_id} to detach");
        wait_until(self.context(), interval, &condition, || async move {
            let volume = self.get_volume(volume_id).await?;
            match volume.linode_id {
                None => Ok(Probe::Ready(())),
                Some(linode_id) => Ok(Probe::Pending(format!("attached to instance {linode_id}"))),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linode::types::EventEntity;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(id: u64, action: &str, entity_id: u64, created: NaiveDateTime) -> Event {
        Event {
            id,
            action: action.to_string(),
            created,
            status: EventStatus::Finished,
            entity: Some(EventEntity {
                id: entity_id,
                entity_type: "linode".to_string(),
                label: String::new(),
            }),
            secondary_entity: None,
            percent_complete: Some(100),
        }
    }

    #[test]
    fn test_filter_shape() {
        let token = EventToken::capture("linode", 42, "linode_boot").at(ts(10, 0, 0));
        let filter = token.filter();
        assert_eq!(filter["entity.id"], json!(42));
        assert_eq!(filter["entity.type"], json!("linode"));
        assert_eq!(filter["created"]["+gte"], json!("2024-03-01T10:00:00"));
        assert_eq!(filter["+order"], json!("asc"));
    }

    #[test]
    fn test_unbound_filter_omits_entity_id() {
        let token = EventToken::unbound("lkecluster", "lke_cluster_create");
        assert!(token.filter().get("entity.id").is_none());
    }

    #[test]
    fn test_back_to_back_tokens_pick_their_own_event() {
        let first = EventToken::capture("linode", 7, "linode_reboot").at(ts(10, 0, 0));
        let second = EventToken::capture("linode", 7, "linode_reboot").at(ts(10, 0, 5));
        let events = vec![
            event(3, "linode_reboot", 7, ts(10, 0, 6)),
            event(2, "linode_reboot", 7, ts(10, 0, 2)),
            event(1, "linode_reboot", 7, ts(9, 59, 0)),
        ];

        assert_eq!(first.select(&events).map(|e| e.id), Some(2));
        assert_eq!(second.select(&events).map(|e| e.id), Some(3));
    }

    #[test]
    fn test_matches_checks_entity_and_secondary() {
        let token = EventToken::capture("linode", 7, "disk_create")
            .at(ts(10, 0, 0))
            .with_secondary(99);
        let mut other_disk = event(1, "disk_create", 7, ts(10, 1, 0));
        other_disk.secondary_entity = Some(EventEntity {
            id: 98,
            entity_type: "disk".to_string(),
            label: String::new(),
        });
        assert!(!token.matches(&other_disk));

        let mut ours = other_disk.clone();
        ours.secondary_entity = Some(EventEntity {
            id: 99,
            entity_type: "disk".to_string(),
            label: String::new(),
        });
        assert!(token.matches(&ours));
        assert!(!token.matches(&event(2, "disk_create", 8, ts(10, 1, 0))));
    }

    #[test]
    fn test_bind_after_create() {
        let mut token = EventToken::unbound("linode", "linode_create").at(ts(10, 0, 0));
        assert!(token.matches(&event(1, "linode_create", 5, ts(10, 0, 1))));
        token.bind(6);
        assert!(!token.matches(&event(1, "linode_create", 5, ts(10, 0, 1))));
    }

    #[tokio::test]
    async fn test_wait_until_returns_ready_value() {
        let ctx = OperationContext::new("test.wait", Duration::from_secs(5));
        let mut calls = 0;
        let value = wait_until(&ctx, Duration::from_millis(1), "counter", || {
            calls += 1;
            let current = calls;
            async move {
                if current >= 3 {
                    Ok(Probe::Ready(current))
                } else {
                    Ok(Probe::Pending(format!("count {current}")))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out_with_last_observed() {
        let ctx = OperationContext::new("test.wait", Duration::from_millis(30));
        let err = wait_until(&ctx, Duration::from_millis(10), "never", || async {
            Ok::<_, crate::error::ProviderError>(Probe::<()>::Pending("still booting".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PollTimeout);
        assert!(err.to_string().contains("still booting"));
    }
}
