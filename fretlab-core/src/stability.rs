//! Stability gating: a value is only confirmed after it has been observed a
//! configured number of times in a row.

#[derive(Debug, Clone)]
pub struct StabilityGate<T> {
    required: u32,
    current: Option<T>,
    streak: u32,
}

impl<T: PartialEq> StabilityGate<T> {
    /// `required` is clamped to at least one observation.
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            current: None,
            streak: 0,
        }
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    /// Records one observation and returns the length of the current streak.
    ///
    /// A value different from the previous one restarts the streak at one.
    pub fn observe(&mut self, value: T) -> u32 {
        if self.current.as_ref() == Some(&value) {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.current = Some(value);
            self.streak = 1;
        }
        self.streak
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// The value being tracked, confirmed or not.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn is_stable(&self) -> bool {
        self.current.is_some() && self.streak >= self.required
    }

    /// The tracked value once its streak reaches the requirement.
    pub fn confirmed(&self) -> Option<&T> {
        if self.is_stable() {
            self.current.as_ref()
        } else {
            None
        }
    }

    /// True exactly on the observation that made the value stable.
    pub fn just_confirmed(&self) -> bool {
        self.current.is_some() && self.streak == self.required
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.streak = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirms_after_required_streak() {
        let mut gate = StabilityGate::new(3);
        assert_eq!(gate.observe('a'), 1);
        assert_eq!(gate.observe('a'), 2);
        assert!(gate.confirmed().is_none());
        assert_eq!(gate.observe('a'), 3);
        assert!(gate.just_confirmed());
        assert_eq!(gate.confirmed(), Some(&'a'));
        gate.observe('a');
        assert!(!gate.just_confirmed());
        assert_eq!(gate.confirmed(), Some(&'a'));
    }

    #[test]
    fn a_different_value_breaks_the_streak() {
        let mut gate = StabilityGate::new(2);
        gate.observe(1);
        gate.observe(1);
        assert!(gate.is_stable());
        assert_eq!(gate.observe(2), 1);
        assert!(!gate.is_stable());
        assert_eq!(gate.current(), Some(&2));
    }

    #[test]
    fn separate_gates_do_not_share_state() {
        let mut first = StabilityGate::new(2);
        let mut second = StabilityGate::new(2);
        first.observe("C Major");
        first.observe("C Major");
        second.observe("G Major");
        assert!(first.is_stable());
        assert!(!second.is_stable());
    }

    #[test]
    fn zero_requirement_behaves_like_one() {
        let mut gate = StabilityGate::new(0);
        gate.observe(7);
        assert_eq!(gate.confirmed(), Some(&7));
        gate.reset();
        assert!(gate.current().is_none());
        assert_eq!(gate.streak(), 0);
    }
}
