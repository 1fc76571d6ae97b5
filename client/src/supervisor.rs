//! Keeps one session alive for the lifetime of the presentation layer

use std::time::{Duration, Instant};

use tandem_shared::{Identity, ServerEvent};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::queue::OutgoingQueue;
use crate::session::ClientSession;

/// Exponential delay between session start attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
            next_attempt: None,
        }
    }

    /// Whether an attempt may be made at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.next_attempt.map_or(true, |at| now >= at)
    }

    /// Record a failed attempt and schedule the next one
    pub fn fail(&mut self, now: Instant) -> Duration {
        let delay = self.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay after `failures` consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Owns the current [`ClientSession`] and replaces it when it dies.
///
/// The outgoing queue is shared across sessions, so commands queued while
/// disconnected are sent by the next session.
pub struct SessionSupervisor {
    config: ClientConfig,
    identity: Identity,
    outgoing: OutgoingQueue,
    session: Option<ClientSession>,
    started_at: Option<Instant>,
    backoff: Backoff,
    leftovers: Vec<ServerEvent>,
}

impl SessionSupervisor {
    pub fn new(config: ClientConfig, identity: Identity) -> Self {
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        Self {
            config,
            identity,
            outgoing: OutgoingQueue::new(),
            session: None,
            started_at: None,
            backoff,
            leftovers: Vec::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn outgoing(&self) -> &OutgoingQueue {
        &self.outgoing
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(ClientSession::is_running)
    }

    /// Called once per presentation tick. Replaces a dead session and, when
    /// the backoff allows, starts a new one. Returns the live session, if any.
    ///
    /// The backoff resets once a session has stayed up for `stable_after`.
    /// A session that dies sooner counts as a failed start.
    pub fn ensure_running(&mut self) -> Option<&ClientSession> {
        let now = Instant::now();
        let uptime = self.started_at.map(|at| now.saturating_duration_since(at));

        if self.session.as_ref().is_some_and(|session| !session.is_running()) {
            if let Some(mut dead) = self.session.take() {
                dead.stop();
                self.leftovers.extend(dead.incoming().drain());
                self.started_at = None;
                match uptime {
                    Some(uptime) if uptime < self.config.stable_after => {
                        let delay = self.backoff.fail(now);
                        warn!(
                            "Session for {} died after {:?} (retrying in {:?})",
                            self.identity, uptime, delay
                        );
                    }
                    _ => warn!("Session for {} is down", self.identity),
                }
            }
        } else if uptime.is_some_and(|uptime| uptime >= self.config.stable_after)
            && self.backoff.failures() > 0
        {
            self.backoff.reset();
        }

        if self.session.is_none() {
            if !self.backoff.ready(now) {
                return None;
            }
            match ClientSession::start(&self.config, self.identity.clone(), self.outgoing.clone()) {
                Ok(session) => {
                    if self.backoff.failures() > 0 {
                        info!("Reconnected as {}", self.identity);
                    }
                    self.started_at = Some(Instant::now());
                    self.session = Some(session);
                }
                Err(e) => {
                    let delay = self.backoff.fail(now);
                    warn!("Could not start session: {} (retrying in {:?})", e, delay);
                    return None;
                }
            }
        }

        self.session.as_ref()
    }

    /// Every event received since the last call, including those a dead
    /// session left behind
    pub fn drain_incoming(&mut self) -> Vec<ServerEvent> {
        let mut events = std::mem::take(&mut self.leftovers);
        if let Some(session) = &self.session {
            events.extend(session.incoming().drain());
        }
        events
    }

    /// Stop the current session, if any
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
        self.started_at = None;
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(0), Duration::from_millis(250));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(6), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_schedule_and_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        let now = Instant::now();
        assert!(backoff.ready(now));

        assert_eq!(backoff.fail(now), Duration::from_millis(100));
        assert!(!backoff.ready(now));
        assert!(backoff.ready(now + Duration::from_millis(100)));

        assert_eq!(backoff.fail(now), Duration::from_millis(200));
        assert_eq!(backoff.failures(), 2);

        backoff.reset();
        assert!(backoff.ready(now));
        assert_eq!(backoff.failures(), 0);
    }

    #[test]
    fn test_supervisor_backs_off_when_relay_missing() {
        let config = ClientConfig {
            relay_url: "ws://127.0.0.1:1/ws".to_string(),
            connect_timeout: Duration::from_millis(500),
            backoff_base: Duration::from_secs(60),
            ..ClientConfig::default()
        };
        let mut supervisor = SessionSupervisor::new(config, Identity::new("user1").unwrap());

        assert!(supervisor.ensure_running().is_none());
        assert!(!supervisor.is_connected());
        // Second tick lands inside the backoff window, so no new attempt.
        assert!(supervisor.ensure_running().is_none());
        assert_eq!(supervisor.backoff.failures(), 1);
    }
}
