//! Messaging transport collaborator.
//!
//! The executor treats dispatch as synchronous: one call, one outcome. An
//! async gateway (SMTP relay, SMS provider) wraps its eventual result into
//! the returned receipt or error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use outreach_core::types::Channel;
use outreach_core::{OutreachError, OutreachResult};

/// Outcome of a single accepted dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub provider_message_id: String,
    pub accepted_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        identity: &str,
        subject: Option<&str>,
        body: &str,
    ) -> OutreachResult<DispatchReceipt>;
}

/// Development transport: logs the message instead of delivering it.
pub struct LoggingTransport;

#[async_trait]
impl MessageTransport for LoggingTransport {
    async fn send(
        &self,
        channel: Channel,
        identity: &str,
        subject: Option<&str>,
        body: &str,
    ) -> OutreachResult<DispatchReceipt> {
        info!(
            %channel,
            identity = %identity,
            subject = subject.unwrap_or(""),
            body_len = body.len(),
            "Dispatching message (logging transport)"
        );
        Ok(DispatchReceipt {
            provider_message_id: format!("log-{}", Uuid::new_v4()),
            accepted_at: Utc::now(),
        })
    }
}

/// Test transport: records every send, fails for configured identities, and
/// never completes for stalled ones.
#[derive(Default)]
pub struct RecordingTransport {
    sends: std::sync::Mutex<Vec<(Channel, String, Option<String>, String)>>,
    fail_for: std::sync::Mutex<std::collections::HashSet<String>>,
    stall_for: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, identity: &str) {
        self.fail_for
            .lock()
            .expect("transport mutex poisoned")
            .insert(identity.to_string());
    }

    /// Sends to this identity hang until the caller's timeout cancels them.
    pub fn stall_for(&self, identity: &str) {
        self.stall_for
            .lock()
            .expect("transport mutex poisoned")
            .insert(identity.to_string());
    }

    pub fn sends(&self) -> Vec<(Channel, String, Option<String>, String)> {
        self.sends.lock().expect("transport mutex poisoned").clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().expect("transport mutex poisoned").len()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(
        &self,
        channel: Channel,
        identity: &str,
        subject: Option<&str>,
        body: &str,
    ) -> OutreachResult<DispatchReceipt> {
        self.sends.lock().expect("transport mutex poisoned").push((
            channel,
            identity.to_string(),
            subject.map(str::to_string),
            body.to_string(),
        ));
        let stalling = self
            .stall_for
            .lock()
            .expect("transport mutex poisoned")
            .contains(identity);
        if stalling {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        let failing = self
            .fail_for
            .lock()
            .expect("transport mutex poisoned")
            .contains(identity);
        if failing {
            return Err(OutreachError::Dispatch(format!(
                "provider rejected message for {identity}"
            )));
        }
        Ok(DispatchReceipt {
            provider_message_id: format!("test-{}", Uuid::new_v4()),
            accepted_at: Utc::now(),
        })
    }
}
