//! Early stopping.

/// What the trainer should do after an evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStopAction {
    /// The monitored value improved on the best so far.
    Improved,
    /// No improvement for `patience` rounds: stop training.
    Stop,
    /// No improvement yet, keep going.
    Continue,
}

/// Stops training when the monitored metric has not improved for `patience`
/// consecutive rounds.
///
/// A patience of 0 disables early stopping.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    higher_is_better: bool,
    best_value: Option<f64>,
    best_round: usize,
    round: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, higher_is_better: bool) -> Self {
        Self {
            patience,
            higher_is_better,
            best_value: None,
            best_round: 0,
            round: 0,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.patience > 0
    }

    /// Round (0-based) with the best value seen so far.
    pub fn best_round(&self) -> usize {
        self.best_round
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    fn is_improvement(&self, value: f64) -> bool {
        match self.best_value {
            None => !value.is_nan(),
            Some(best) if self.higher_is_better => value > best,
            Some(best) => value < best,
        }
    }

    /// Record the value for the next round.
    ///
    /// Always tracks the best round; only returns [`EarlyStopAction::Stop`]
    /// when enabled.
    pub fn update(&mut self, value: f64) -> EarlyStopAction {
        let round = self.round;
        self.round += 1;

        if self.is_improvement(value) {
            self.best_value = Some(value);
            self.best_round = round;
            return EarlyStopAction::Improved;
        }

        if self.is_enabled() && round - self.best_round >= self.patience {
            EarlyStopAction::Stop
        } else {
            EarlyStopAction::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_rounds() {
        let mut es = EarlyStopping::new(2, false);
        assert_eq!(es.update(1.0), EarlyStopAction::Improved);
        assert_eq!(es.update(0.5), EarlyStopAction::Improved);
        assert_eq!(es.update(0.6), EarlyStopAction::Continue);
        assert_eq!(es.update(0.7), EarlyStopAction::Stop);
        assert_eq!(es.best_round(), 1);
        assert_eq!(es.best_value(), Some(0.5));
    }

    #[test]
    fn higher_is_better() {
        let mut es = EarlyStopping::new(1, true);
        es.update(0.1);
        assert_eq!(es.update(0.2), EarlyStopAction::Improved);
        assert_eq!(es.update(0.15), EarlyStopAction::Stop);
    }

    #[test]
    fn disabled_never_stops_but_tracks_best() {
        let mut es = EarlyStopping::new(0, false);
        assert!(!es.is_enabled());
        es.update(1.0);
        for _ in 0..10 {
            assert_eq!(es.update(2.0), EarlyStopAction::Continue);
        }
        assert_eq!(es.best_round(), 0);
    }

    #[test]
    fn nan_never_improves() {
        let mut es = EarlyStopping::new(1, false);
        assert_eq!(es.update(f64::NAN), EarlyStopAction::Continue);
        assert_eq!(es.best_value(), None);
    }
}
