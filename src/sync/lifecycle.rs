//! Lifecycle events and the auto-sync subscription state machine

use serde::{Deserialize, Serialize};

/// Events the host application forwards to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Document opened and ready
    ReaderReady,
    /// Reader moved to another page / position counter
    PageUpdate(u64),
    CloseDocument,
    Suspend,
    Resume,
    NetworkConnected,
    NetworkDisconnecting,
    /// Manual "push now"
    PushNow,
    /// Manual "pull now"
    PullNow,
}

/// Payload-free discriminant of `LifecycleEvent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    ReaderReady,
    PageUpdate,
    CloseDocument,
    Suspend,
    Resume,
    NetworkConnected,
    NetworkDisconnecting,
    PushNow,
    PullNow,
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleEventKind {
        match self {
            LifecycleEvent::ReaderReady => LifecycleEventKind::ReaderReady,
            LifecycleEvent::PageUpdate(_) => LifecycleEventKind::PageUpdate,
            LifecycleEvent::CloseDocument => LifecycleEventKind::CloseDocument,
            LifecycleEvent::Suspend => LifecycleEventKind::Suspend,
            LifecycleEvent::Resume => LifecycleEventKind::Resume,
            LifecycleEvent::NetworkConnected => LifecycleEventKind::NetworkConnected,
            LifecycleEvent::NetworkDisconnecting => LifecycleEventKind::NetworkDisconnecting,
            LifecycleEvent::PushNow => LifecycleEventKind::PushNow,
            LifecycleEvent::PullNow => LifecycleEventKind::PullNow,
        }
    }
}

const MANUAL_EVENTS: &[LifecycleEventKind] =
    &[LifecycleEventKind::PushNow, LifecycleEventKind::PullNow];

const AUTO_SYNC_EVENTS: &[LifecycleEventKind] = &[
    LifecycleEventKind::ReaderReady,
    LifecycleEventKind::PageUpdate,
    LifecycleEventKind::CloseDocument,
    LifecycleEventKind::Suspend,
    LifecycleEventKind::Resume,
    LifecycleEventKind::NetworkConnected,
    LifecycleEventKind::NetworkDisconnecting,
    LifecycleEventKind::PushNow,
    LifecycleEventKind::PullNow,
];

/// Whether lifecycle events trigger syncs. Each state declares its subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoSync {
    On,
    #[default]
    Off,
}

impl AutoSync {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            AutoSync::On
        } else {
            AutoSync::Off
        }
    }

    pub fn is_on(&self) -> bool {
        *self == AutoSync::On
    }

    /// Events this state reacts to; manual commands are in every state
    pub fn subscriptions(&self) -> &'static [LifecycleEventKind] {
        match self {
            AutoSync::On => AUTO_SYNC_EVENTS,
            AutoSync::Off => MANUAL_EVENTS,
        }
    }

    pub fn subscribes(&self, kind: LifecycleEventKind) -> bool {
        self.subscriptions().contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_off_only_listens_to_manual_commands() {
        let off = AutoSync::Off;
        assert!(off.subscribes(LifecycleEventKind::PushNow));
        assert!(off.subscribes(LifecycleEventKind::PullNow));
        assert!(!off.subscribes(LifecycleEventKind::PageUpdate));
        assert!(!off.subscribes(LifecycleEventKind::Suspend));
        assert!(!off.subscribes(LifecycleEventKind::NetworkConnected));
    }

    #[test]
    fn test_on_listens_to_everything() {
        let on = AutoSync::from_enabled(true);
        assert!(on.is_on());
        for kind in AUTO_SYNC_EVENTS {
            assert!(on.subscribes(*kind));
        }
        assert_eq!(
            LifecycleEvent::PageUpdate(12).kind(),
            LifecycleEventKind::PageUpdate
        );
    }
}
