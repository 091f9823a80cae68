use crate::timer::{arm, fire, Timer};
use std::time::Duration;
use tokio::sync::mpsc;

/// Collapses bursts of values into one call carrying the last value,
/// made once `delay` passes with no new value.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn<F>(delay: Duration, action: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(delay, rx, action));
        Self { tx }
    }

    pub fn push(&self, value: T) {
        let _ = self.tx.send(value);
    }
}

async fn run<T, F>(delay: Duration, mut rx: mpsc::UnboundedReceiver<T>, mut action: F)
where
    F: FnMut(T),
{
    let mut pending: Option<T> = None;
    let mut timer: Timer = None;

    loop {
        tokio::select! {
            value = rx.recv() => match value {
                Some(value) => {
                    pending = Some(value);
                    timer = arm(delay);
                }
                None => {
                    // Last handle dropped; don't lose the final value.
                    if let Some(value) = pending.take() {
                        action(value);
                    }
                    return;
                }
            },
            () = fire(&mut timer), if timer.is_some() => {
                timer = None;
                if let Some(value) = pending.take() {
                    action(value);
                }
            }
        }
    }
}
