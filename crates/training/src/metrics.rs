//! Confusion-matrix based classification metrics: accuracy, per-class
//! precision/recall/F1, and macro-F1.

/// Square confusion matrix; rows are true classes, columns predictions.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<usize>,
}

/// Per-class statistics. Undefined ratios (empty denominator) are zero,
/// matching the usual zero-division convention for classification reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassStats {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    pub fn record(&mut self, truth: usize, pred: usize) {
        if truth < self.num_classes && pred < self.num_classes {
            self.counts[truth * self.num_classes + pred] += 1;
        }
    }

    pub fn record_all(&mut self, truths: &[i64], preds: &[i64]) {
        for (&t, &p) in truths.iter().zip(preds.iter()) {
            self.record(t as usize, p as usize);
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes)
            .map(|i| self.counts[i * self.num_classes + i])
            .sum()
    }

    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f32 / total as f32
    }

    pub fn per_class(&self) -> Vec<ClassStats> {
        (0..self.num_classes)
            .map(|c| {
                let tp = self.counts[c * self.num_classes + c];
                let support: usize = (0..self.num_classes)
                    .map(|p| self.counts[c * self.num_classes + p])
                    .sum();
                let predicted: usize = (0..self.num_classes)
                    .map(|t| self.counts[t * self.num_classes + c])
                    .sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassStats {
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Unweighted mean of per-class F1 scores.
    pub fn macro_f1(&self) -> f32 {
        let stats = self.per_class();
        if stats.is_empty() {
            return 0.0;
        }
        stats.iter().map(|s| s.f1).sum::<f32>() / stats.len() as f32
    }

    /// Human-readable per-class table for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::from("class  precision  recall     f1         support\n");
        for (c, s) in self.per_class().iter().enumerate() {
            out.push_str(&format!(
                "{:<6} {:<10.4} {:<10.4} {:<10.4} {}\n",
                c, s.precision, s.recall, s.f1, s.support
            ));
        }
        out.push_str(&format!(
            "accuracy {:.4}  macro_f1 {:.4}  total {}\n",
            self.accuracy(),
            self.macro_f1(),
            self.total()
        ));
        out
    }
}

fn ratio(num: usize, denom: usize) -> f32 {
    if denom == 0 {
        0.0
    } else {
        num as f32 / denom as f32
    }
}
