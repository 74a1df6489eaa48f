use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Call `check` every `interval` until it yields `Poll::Ready` or `timeout`
/// has elapsed since the first call. `None` means the deadline passed.
///
/// The first check happens immediately and one last check is made at the
/// deadline, so a zero timeout still polls once.
pub async fn poll_until<T, F, Fut>(settings: &PollSettings, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Poll<T>>,
{
    let deadline = Instant::now() + settings.timeout;
    loop {
        if let Poll::Ready(value) = check().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(settings.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings(interval: u64, timeout: u64) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(interval),
            timeout: Duration::from_secs(timeout),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_ready() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let got = poll_until(&settings(5, 60), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                Poll::Ready("done")
            } else {
                Poll::Pending
            }
        })
        .await;
        assert_eq!(got, Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_deadline() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let got: Option<()> = poll_until(&settings(5, 12), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Poll::Pending
        })
        .await;
        assert!(got.is_none());
        // t=0, 5, 10, 12
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }
}
