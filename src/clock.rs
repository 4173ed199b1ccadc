use chrono::{DateTime, Utc};

/// Time source injected into the engine so date-sensitive logic stays
/// testable with pinned timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_fixed_clock_pins_time_behind_the_trait() {
        let at = DateTime::parse_from_rfc3339("2025-01-15T09:30:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(at));
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }
}
