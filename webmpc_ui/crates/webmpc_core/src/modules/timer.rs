use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Sleep;

pub(crate) type Timer = Option<Pin<Box<Sleep>>>;

/// Replacing the previous value drops (cancels) any pending timer.
pub(crate) fn arm(delay: Duration) -> Timer {
    Some(Box::pin(tokio::time::sleep(delay)))
}

pub(crate) async fn fire(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
