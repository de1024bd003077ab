use kernelscout_protocol::KernelConnection;
use tokio::sync::broadcast;

/// Capacity of the lifecycle broadcast. Finders only debounce or coalesce
/// on reception, so a lagged receiver simply refreshes once more.
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Kernel start/stop notification published by the host runtime.
#[derive(Debug, Clone)]
pub enum KernelLifecycleEvent {
    Started(KernelConnection),
    Disposed(KernelConnection),
}

impl KernelLifecycleEvent {
    pub fn connection(&self) -> &KernelConnection {
        match self {
            Self::Started(connection) | Self::Disposed(connection) => connection,
        }
    }
}

/// Fan-out hub between the host's kernel runtime and the remote finders.
///
/// Cloning shares the underlying channel; the host keeps one clone to
/// publish events and each finder subscribes through its own clone.
#[derive(Debug, Clone)]
pub struct KernelLifecycleHub {
    tx: broadcast::Sender<KernelLifecycleEvent>,
}

impl KernelLifecycleHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn kernel_started(&self, connection: KernelConnection) {
        let _ = self.tx.send(KernelLifecycleEvent::Started(connection));
    }

    pub fn kernel_disposed(&self, connection: KernelConnection) {
        let _ = self.tx.send(KernelLifecycleEvent::Disposed(connection));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelLifecycleEvent> {
        self.tx.subscribe()
    }
}

impl Default for KernelLifecycleHub {
    fn default() -> Self {
        Self::new()
    }
}
