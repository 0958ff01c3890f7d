//! Scoring helpers for correction quality.

use serde::Serialize;

/// Weighted harmonic mean of precision and recall. `beta < 1` favours precision.
pub fn f_beta(precision: f64, recall: f64, beta: f64) -> f64 {
    if precision + recall == 0.0 {
        return 0.0;
    }
    let b2 = beta * beta;
    (1.0 + b2) * precision * recall / (b2 * precision + recall)
}

/// `(precision, recall)`; each is `0.0` when its denominator is zero.
pub fn precision_recall_from_counts(tp: u64, fp: u64, fn_: u64) -> (f64, f64) {
    let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    (ratio(tp, tp + fp), ratio(tp, tp + fn_))
}

/// Sentence-level edit counts.
///
/// A sentence counts as a true positive when the system changed it and the
/// change matches the gold correction, a false positive when it changed it
/// any other way, and a false negative when gold needed a change the system
/// did not produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SentenceScores {
    pub sentences: u64,
    pub exact: u64,
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl SentenceScores {
    pub fn record(&mut self, input: &str, hypothesis: &str, gold: &str) {
        let input = squash(input);
        let hypothesis = squash(hypothesis);
        let gold = squash(gold);

        self.sentences += 1;
        if hypothesis == gold {
            self.exact += 1;
        }
        let edited = hypothesis != input;
        let needed = gold != input;
        match (edited, hypothesis == gold) {
            (true, true) => self.tp += 1,
            (true, false) => {
                self.fp += 1;
                if needed {
                    self.fn_ += 1;
                }
            }
            (false, _) if needed => self.fn_ += 1,
            (false, _) => {}
        }
    }

    pub fn precision_recall(&self) -> (f64, f64) {
        precision_recall_from_counts(self.tp, self.fp, self.fn_)
    }

    /// F0.5, the usual GEC headline number.
    pub fn f05(&self) -> f64 {
        let (p, r) = self.precision_recall();
        f_beta(p, r, 0.5)
    }

    pub fn accuracy(&self) -> f64 {
        if self.sentences == 0 {
            0.0
        } else {
            self.exact as f64 / self.sentences as f64
        }
    }
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
