use tokio::sync::watch;

/// Firing half of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Listening half; cheap to clone into every loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger fires. A dropped trigger never fires.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Fire `trigger` on Ctrl-C, or SIGTERM on unix.
pub async fn on_signal(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable; Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown requested");
    trigger.fire();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_fire() {
        let (trigger, mut shutdown) = channel();
        assert!(!shutdown.is_fired());
        let waiter = tokio::spawn(async move {
            shutdown.wait().await;
        });
        trigger.fire();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("wait should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_trigger_never_fires() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);
        let res = tokio::time::timeout(Duration::from_millis(50), shutdown.wait()).await;
        assert!(res.is_err());
    }
}
