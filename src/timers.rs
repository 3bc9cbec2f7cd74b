//! Session-scoped scheduled work
//!
//! Everything a session schedules (settle delays, deferred chat, eat and
//! search tasks) runs under one cancellation token and reports back as a
//! typed event. Tearing the session down is a single `cancel_all`.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ActionError;

pub struct SessionTimers<E> {
    token: CancellationToken,
    tx: mpsc::UnboundedSender<E>,
}

impl<E: Send + 'static> SessionTimers<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self {
            token: CancellationToken::new(),
            tx,
        }
    }

    /// Deliver `event` after `delay` unless cancelled first
    pub fn after(&self, delay: Duration, event: E) {
        self.run(async move {
            tokio::time::sleep(delay).await;
            event
        });
    }

    /// Run `task` in the background and deliver its result
    pub fn run<F>(&self, task: F)
    where
        F: Future<Output = E> + Send + 'static,
    {
        let token = self.token.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                event = task => {
                    let _ = tx.send(event);
                }
            }
        });
    }

    pub fn cancel_all(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<E> Drop for SessionTimers<E> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Roughly 30 years; stands in for deadlines past the clock's range
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, saturating instead of panicking on overflow
pub fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Race an action against `limit`
pub async fn bounded<T, F>(action: &'static str, limit: Duration, fut: F) -> Result<T, ActionError>
where
    F: Future<Output = Result<T, ActionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ActionError::Timeout { action, after: limit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_after_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = SessionTimers::new(tx);
        timers.after(Duration::from_millis(1000), 7u32);

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_drops_pending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = SessionTimers::new(tx.clone());
        timers.after(Duration::from_millis(1000), 1u32);
        timers.run(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            2u32
        });
        timers.cancel_all();
        assert!(timers.is_cancelled());

        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(3).unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_secs(3)), now + Duration::from_secs(3));

        let far = deadline_after(now, Duration::MAX);
        assert!(far > now + Duration::from_secs(86_400 * 365));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<(), ActionError> = bounded("eat", Duration::from_millis(9000), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(ActionError::Timeout {
                action: "eat",
                after: Duration::from_millis(9000)
            })
        );
    }

    #[tokio::test]
    async fn test_bounded_passes_result() {
        let ok = bounded("open", Duration::from_secs(1), async { Ok::<_, ActionError>(5) }).await;
        assert_eq!(ok, Ok(5));

        let err = bounded("open", Duration::from_secs(1), async {
            Err::<(), _>(ActionError::Rejected("locked".into()))
        })
        .await;
        assert_eq!(err, Err(ActionError::Rejected("locked".into())));
    }
}
