use tokio::sync::watch;

/// Owned by the context that started some work (a screen, a command, a
/// session). Ending it, explicitly or by dropping it, tells every
/// [`Liveness`] handed out that results are no longer wanted.
#[derive(Debug)]
pub struct Lifetime {
    tx: watch::Sender<bool>,
}

impl Lifetime {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn end(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_alive(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.end();
    }
}

/// Read side of a [`Lifetime`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Liveness {
    rx: Option<watch::Receiver<bool>>,
}

impl Liveness {
    /// A liveness that never ends, for callers with no owning context.
    pub fn always() -> Self {
        Self { rx: None }
    }

    pub fn is_alive(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow(),
            None => true,
        }
    }

    /// Resolves once the owning context has ended. Never resolves for
    /// [`Liveness::always`].
    pub async fn ended(&self) {
        match &self.rx {
            Some(rx) => {
                let mut rx = rx.clone();
                // Err means the sender is gone, which also counts as ended
                let _ = rx.wait_for(|alive| !*alive).await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
