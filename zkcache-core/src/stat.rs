//! Node metadata and watch event types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Version and bookkeeping metadata that accompanies every node read.
///
/// Field meanings follow ZooKeeper: `*zxid` fields are transaction ids,
/// `ctime`/`mtime` are epoch milliseconds, and `version` is bumped on every
/// data write so callers can do optimistic-concurrency checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id of the create.
    pub czxid: i64,
    /// Transaction id of the last data modification.
    pub mzxid: i64,
    /// Transaction id of the last child change.
    pub pzxid: i64,
    /// Creation time, epoch millis.
    pub ctime: i64,
    /// Last modification time, epoch millis.
    pub mtime: i64,
    /// Number of data changes.
    pub version: i32,
    /// Number of child changes.
    pub cversion: i32,
    /// Number of ACL changes.
    pub aversion: i32,
    /// Owning session id for ephemeral nodes, zero otherwise.
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
}

impl Stat {
    /// A stat carrying only a data version.
    pub fn new(version: i32) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Creation time as a UTC timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        millis_to_utc(self.ctime)
    }

    /// Last modification time as a UTC timestamp.
    pub fn modified_at(&self) -> DateTime<Utc> {
        millis_to_utc(self.mtime)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Kind of change a watch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Session state change, no node involved.
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// Session state at the time an event was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeeperState {
    SyncConnected,
    Disconnected,
    Expired,
    AuthFailed,
}

/// A one-shot notification pushed by the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub state: KeeperState,
    /// The node that changed; `None` for pure session events.
    pub path: Option<String>,
}

impl WatchedEvent {
    /// A node event on a connected session.
    pub fn node(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            state: KeeperState::SyncConnected,
            path: Some(path.into()),
        }
    }

    /// A session state change with no node attached.
    pub fn session(state: KeeperState) -> Self {
        Self {
            event_type: EventType::None,
            state,
            path: None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        self.state == KeeperState::Expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_new_sets_version_only() {
        let stat = Stat::new(7);
        assert_eq!(stat.version, 7);
        assert_eq!(stat.mzxid, 0);
        assert!(!stat.is_ephemeral());
    }

    #[test]
    fn test_stat_timestamps() {
        let stat = Stat {
            ctime: 1_000,
            mtime: 86_400_000,
            ..Default::default()
        };
        assert_eq!(stat.created_at().timestamp_millis(), 1_000);
        assert_eq!(stat.modified_at().timestamp(), 86_400);
    }

    #[test]
    fn test_stat_serde_field_names() {
        let stat = Stat {
            ephemeral_owner: 42,
            ..Stat::new(3)
        };
        let json = serde_json::to_value(stat).expect("stat serializes");
        assert_eq!(json["version"], 3);
        assert_eq!(json["ephemeral_owner"], 42);
        assert!(stat.is_ephemeral());
    }

    #[test]
    fn test_watched_event_constructors() {
        let event = WatchedEvent::node(EventType::NodeDataChanged, "/a");
        assert_eq!(event.path.as_deref(), Some("/a"));
        assert!(!event.is_session_expired());

        let expired = WatchedEvent::session(KeeperState::Expired);
        assert_eq!(expired.event_type, EventType::None);
        assert!(expired.path.is_none());
        assert!(expired.is_session_expired());
    }
}
