use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Notification published by a store after a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    MovementsChanged,
    TemplatesChanged,
    WorkoutsChanged,
    RestTimerStarted { seconds: u32 },
    RestTimerStopped,
}

/// Broadcast channel connecting the stores to external observers.
///
/// Publishing never fails; events sent while no observer is subscribed are
/// dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
