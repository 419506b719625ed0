use tokio_util::sync::CancellationToken;

/// Cooperative shutdown shared by every background task of the process.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignals {
    pub token: CancellationToken,
}

impl ShutdownSignals {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}
