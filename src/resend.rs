//! Bounded resend of commands the device reports as failed.

use crate::command::DeviceCommand;
use crate::error::{ERR_RETRY_EXHAUSTED, Result, get_error_message};
use crate::transport::Transport;
use log::{debug, error, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};

/// Substring the control tool prints when the device rejected a command.
pub const FAILURE_MARKER: &str = "failed";

/// Resends allowed after the first attempt.
pub const MAX_RESENDS: u32 = 10;

/// Pause between two attempts.
pub const RESEND_DELAY: Duration = Duration::from_millis(500);

/// Replays a command until the failure marker disappears or the bound is hit.
///
/// Exhausting the bound is logged, not returned: the caller receives the last
/// response either way.
pub struct ResendController {
    transport: Arc<dyn Transport>,
    attempts: AtomicU32,
    max_resends: u32,
    delay: Duration,
}

impl ResendController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            attempts: AtomicU32::new(0),
            max_resends: MAX_RESENDS,
            delay: RESEND_DELAY,
        }
    }

    #[cfg(test)]
    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sends `command`, replaying it while the response carries the failure
    /// marker.
    ///
    /// When `online` is false nothing is sent and an empty response is
    /// returned. Transport errors end the sequence immediately.
    pub async fn send_with_retry(&self, command: &DeviceCommand, online: bool) -> Result<String> {
        if !online {
            debug!("Device offline, skipping '{}'", command);
            return Ok(String::new());
        }

        loop {
            let response = match self.transport.execute(command).await {
                Ok(r) => r,
                Err(e) => {
                    self.attempts.store(0, Ordering::SeqCst);
                    return Err(e);
                }
            };

            if !response.contains(FAILURE_MARKER) {
                self.attempts.store(0, Ordering::SeqCst);
                return Ok(response);
            }

            let attempts = self.attempts.load(Ordering::SeqCst);
            if attempts >= self.max_resends {
                error!(
                    "{} ('{}', {} resends)",
                    get_error_message(ERR_RETRY_EXHAUSTED),
                    command,
                    attempts
                );
                self.attempts.store(0, Ordering::SeqCst);
                return Ok(response);
            }

            self.attempts.store(attempts + 1, Ordering::SeqCst);
            warn!(
                "Command '{}' failed, resending ({}/{})",
                command,
                attempts + 1,
                self.max_resends
            );
            sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PurifierError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replies from a script, repeating the last entry once it runs out.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String>>>,
        sent: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn execute(&self, command: &DeviceCommand) -> Result<String> {
            self.sent.lock().push(command.to_string());
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_immediately() {
        let transport = Scripted::new(vec![Ok("Setting pwr to 1\n".to_string())]);
        let controller = ResendController::new(transport.clone());

        let start = tokio::time::Instant::now();
        let response = controller
            .send_with_retry(&DeviceCommand::status(), true)
            .await
            .unwrap();

        assert_eq!(response, "Setting pwr to 1\n");
        assert_eq!(transport.sent(), 1);
        assert_eq!(controller.attempts(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let transport = Scripted::new(vec![
            Ok("request failed".to_string()),
            Ok("request failed".to_string()),
            Ok("done".to_string()),
        ]);
        let controller = ResendController::new(transport.clone());

        let start = tokio::time::Instant::now();
        let response = controller
            .send_with_retry(&DeviceCommand::status(), true)
            .await
            .unwrap();

        assert_eq!(response, "done");
        assert_eq!(transport.sent(), 3);
        assert_eq!(controller.attempts(), 0);
        assert_eq!(start.elapsed(), RESEND_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bound_without_error() {
        let transport = Scripted::new(vec![Ok("send failed".to_string())]);
        let controller = ResendController::new(transport.clone());

        let start = tokio::time::Instant::now();
        let response = controller
            .send_with_retry(&DeviceCommand::status(), true)
            .await
            .unwrap();

        assert_eq!(response, "send failed");
        assert_eq!(transport.sent(), 1 + MAX_RESENDS as usize);
        assert_eq!(controller.attempts(), 0);
        assert_eq!(start.elapsed(), RESEND_DELAY * MAX_RESENDS);
    }

    #[tokio::test]
    async fn offline_sends_nothing() {
        let transport = Scripted::new(vec![Ok("ok".to_string())]);
        let controller = ResendController::new(transport.clone());

        let response = controller
            .send_with_retry(&DeviceCommand::status(), false)
            .await
            .unwrap();

        assert!(response.is_empty());
        assert_eq!(transport.sent(), 0);
        assert_eq!(controller.attempts(), 0);
    }

    #[tokio::test]
    async fn transport_error_is_propagated() {
        let transport = Scripted::new(vec![Err(PurifierError::Transport("boom".into()))]);
        let controller = ResendController::new(transport.clone());

        let err = controller
            .send_with_retry(&DeviceCommand::status(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, PurifierError::Transport(_)));
        assert_eq!(transport.sent(), 1);
    }
}
