use crate::error::NotifyError;
use crate::{ChannelSender, SenderRegistry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Test sender that fails a configurable number of times before
/// succeeding, counting every attempt.
struct FlakySender {
    fail_first: u32,
    attempts: Arc<AtomicU32>,
    invalid_config: bool,
}

#[async_trait]
impl ChannelSender for FlakySender {
    async fn send(
        &self,
        _config: &str,
        _title: &str,
        _body: &str,
        _is_recovery: bool,
    ) -> Result<(), NotifyError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.invalid_config {
            return Err(NotifyError::InvalidConfig("bad".to_string()));
        }
        if n <= self.fail_first {
            return Err(NotifyError::Other(format!("transient failure {n}")));
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "flaky"
    }
}

#[test]
fn default_registry_has_builtin_senders() {
    let registry = SenderRegistry::default();
    let mut types = registry.sender_types();
    types.sort();
    assert_eq!(types, vec!["lark", "telegram"]);
    assert!(registry.has_sender("telegram"));
    assert!(!registry.has_sender("dingtalk"));
}

#[tokio::test]
async fn unknown_channel_type_fails_without_attempts() {
    let registry = SenderRegistry::new();
    let err = registry
        .send("nope", "{}", "t", "b", false)
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::UnknownChannelType(_)));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_up_to_three_times() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut registry = SenderRegistry::new();
    registry.register(Box::new(FlakySender {
        fail_first: 2,
        attempts: attempts.clone(),
        invalid_config: false,
    }));

    registry.send("flaky", "{}", "t", "b", false).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_returns_last_error_after_three_attempts() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut registry = SenderRegistry::new();
    registry.register(Box::new(FlakySender {
        fail_first: 10,
        attempts: attempts.clone(),
        invalid_config: false,
    }));

    let err = registry
        .send("flaky", "{}", "t", "b", false)
        .await
        .unwrap_err();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(err.to_string().contains("transient failure 3"));
}

#[tokio::test]
async fn invalid_config_is_not_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut registry = SenderRegistry::new();
    registry.register(Box::new(FlakySender {
        fail_first: 0,
        attempts: attempts.clone(),
        invalid_config: true,
    }));

    let err = registry
        .send("flaky", "{}", "t", "b", false)
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::InvalidConfig(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
