//! Courtesy throttle between remote calls.

use std::time::Duration;

use tracing::trace;

/// Fixed-interval pauses inserted by the pipeline between outbound calls.
///
/// `member_delay` follows every player stats call, successful or not;
/// `squad_delay` follows every processed squad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throttle {
    member_delay: Duration,
    squad_delay: Duration,
}

impl Throttle {
    pub fn new(member_delay: Duration, squad_delay: Duration) -> Self {
        Self {
            member_delay,
            squad_delay,
        }
    }

    /// A throttle that never sleeps.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn member_delay(&self) -> Duration {
        self.member_delay
    }

    pub fn squad_delay(&self) -> Duration {
        self.squad_delay
    }

    /// Pause after a player stats call.
    pub async fn after_player(&self) {
        Self::pause(self.member_delay).await;
    }

    /// Pause after finishing a squad.
    pub async fn after_squad(&self) {
        Self::pause(self.squad_delay).await;
    }

    async fn pause(delay: Duration) {
        if delay.is_zero() {
            return;
        }
        trace!("Throttling for {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(500))
    }
}
