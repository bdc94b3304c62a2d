//! Permission gate for sensor access
//!
//! Access is requested only on explicit user action. The gate hands out a
//! [`Capability`] on success; nothing else can construct one, so a session
//! that needs sensor input cannot start without going through here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AccessError;

/// Proof that sensor access was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    _granted: (),
}

#[cfg(test)]
impl Capability {
    pub(crate) fn granted_for_tests() -> Self {
        Self { _granted: () }
    }
}

/// Answer of the platform's permission API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// Host platform owning the sensor permission
#[async_trait]
pub trait SensorPlatform: Send + Sync {
    /// Whether a permission API exists at all
    fn has_permission_api(&self) -> bool;

    /// Ask once. The platform decides whether asking again re-prompts.
    async fn request_permission(&self) -> Result<PermissionState>;
}

/// Asks the user on the terminal
///
/// Without an interactive stdin there is nobody to ask, which is reported as
/// a missing permission API.
pub struct TerminalPrompt {
    prompt: String,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            prompt: "Allow this app to read the device's orientation sensor?".to_string(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorPlatform for TerminalPrompt {
    fn has_permission_api(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        let prompt = self.prompt.clone();
        let granted = tokio::task::spawn_blocking(move || crate::cli::confirm(&prompt))
            .await
            .context("Permission prompt task failed")??;

        Ok(if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        })
    }
}

/// Grants without asking (pointer input, headless runs)
pub struct AutoGrant;

#[async_trait]
impl SensorPlatform for AutoGrant {
    fn has_permission_api(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        Ok(PermissionState::Granted)
    }
}

/// Where user-visible permission notices go
pub trait NoticeSink: Send + Sync {
    fn notify(&self, error: AccessError);
}

/// Prints notices to stderr
pub struct ConsoleNotice;

impl NoticeSink for ConsoleNotice {
    fn notify(&self, error: AccessError) {
        warn!("{}", error);
        eprintln!("\n{} {}\n", "⚠".yellow().bold(), error.to_string().yellow());
    }
}

pub struct PermissionGate {
    platform: Arc<dyn SensorPlatform>,
    notices: Arc<dyn NoticeSink>,
    granted: AtomicBool,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn SensorPlatform>, notices: Arc<dyn NoticeSink>) -> Self {
        Self {
            platform,
            notices,
            granted: AtomicBool::new(false),
        }
    }

    /// Request sensor access. Call only in response to a user action.
    ///
    /// A denial is not remembered: calling again asks the platform again.
    /// Once granted, later calls return a capability without asking.
    pub async fn request_access(&self) -> Result<Capability, AccessError> {
        if self.is_granted() {
            return Ok(Capability { _granted: () });
        }

        if !self.platform.has_permission_api() {
            self.notices.notify(AccessError::UnsupportedPlatform);
            return Err(AccessError::UnsupportedPlatform);
        }

        let state = match self.platform.request_permission().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Permission request failed, treating as denied: {:#}", e);
                PermissionState::Denied
            }
        };

        match state {
            PermissionState::Granted => {
                self.granted.store(true, Ordering::SeqCst);
                info!("🔓 Sensor access granted");
                Ok(Capability { _granted: () })
            }
            PermissionState::Denied => {
                self.notices.notify(AccessError::PermissionDenied);
                Err(AccessError::PermissionDenied)
            }
        }
    }

    /// Capability flag. Never goes back to `false` once set.
    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Platform answering from a script
    struct ScriptedPlatform {
        api: bool,
        answers: Mutex<VecDeque<Result<PermissionState>>>,
        calls: AtomicUsize,
    }

    impl ScriptedPlatform {
        fn new(api: bool, answers: Vec<Result<PermissionState>>) -> Arc<Self> {
            Arc::new(Self {
                api,
                answers: Mutex::new(answers.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SensorPlatform for ScriptedPlatform {
        fn has_permission_api(&self) -> bool {
            self.api
        }

        async fn request_permission(&self) -> Result<PermissionState> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .pop_front()
                .unwrap_or(Ok(PermissionState::Denied))
        }
    }

    #[derive(Default)]
    struct RecordingNotice {
        seen: Mutex<Vec<AccessError>>,
    }

    impl NoticeSink for RecordingNotice {
        fn notify(&self, error: AccessError) {
            self.seen.lock().push(error);
        }
    }

    #[tokio::test]
    async fn test_unsupported_platform_never_grants() {
        let platform = ScriptedPlatform::new(false, vec![Ok(PermissionState::Granted)]);
        let notices = Arc::new(RecordingNotice::default());
        let gate = PermissionGate::new(platform.clone(), notices.clone());

        for _ in 0..3 {
            assert_eq!(
                gate.request_access().await,
                Err(AccessError::UnsupportedPlatform)
            );
            assert!(!gate.is_granted());
        }

        assert_eq!(platform.calls(), 0);
        assert_eq!(
            *notices.seen.lock(),
            vec![AccessError::UnsupportedPlatform; 3]
        );
    }

    #[tokio::test]
    async fn test_denial_is_not_cached() {
        let platform = ScriptedPlatform::new(
            true,
            vec![Ok(PermissionState::Denied), Ok(PermissionState::Granted)],
        );
        let notices = Arc::new(RecordingNotice::default());
        let gate = PermissionGate::new(platform.clone(), notices.clone());

        assert_eq!(gate.request_access().await, Err(AccessError::PermissionDenied));
        assert!(!gate.is_granted());

        assert!(gate.request_access().await.is_ok());
        assert!(gate.is_granted());
        assert_eq!(platform.calls(), 2);
        assert_eq!(*notices.seen.lock(), vec![AccessError::PermissionDenied]);
    }

    #[tokio::test]
    async fn test_grant_never_reverts() {
        let platform = ScriptedPlatform::new(
            true,
            vec![Ok(PermissionState::Granted), Ok(PermissionState::Denied)],
        );
        let gate = PermissionGate::new(platform.clone(), Arc::new(RecordingNotice::default()));

        assert!(gate.request_access().await.is_ok());
        assert!(gate.request_access().await.is_ok());
        assert!(gate.is_granted());
        assert_eq!(platform.calls(), 1);
    }

    #[tokio::test]
    async fn test_platform_error_counts_as_denial() {
        let platform = ScriptedPlatform::new(true, vec![Err(anyhow!("sensor busy"))]);
        let notices = Arc::new(RecordingNotice::default());
        let gate = PermissionGate::new(platform, notices.clone());

        assert_eq!(gate.request_access().await, Err(AccessError::PermissionDenied));
        assert_eq!(*notices.seen.lock(), vec![AccessError::PermissionDenied]);
    }

    #[tokio::test]
    async fn test_auto_grant() {
        let gate = PermissionGate::new(Arc::new(AutoGrant), Arc::new(RecordingNotice::default()));
        assert!(gate.request_access().await.is_ok());
    }
}
