//! Rule-based fallback classifier
//!
//! Maps a [`FeatureVector`] to a primary class through priority-ordered
//! rules (first match wins), adds bounded random jitter to the rule's base
//! confidence, then synthesizes a ranked top-3 distribution.
//!
//! The thresholds, base confidences and jitter spreads in [`decide`] are
//! hand-tuned calibration constants.

use crate::features::{DominantHue, FeatureVector};
use geolens_core::{ClassLabel, ClassificationEntry, IdentificationResult};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of ranked entries in a result
pub const TOP_K: usize = 3;

/// Seedable random source for confidence jitter and score synthesis
pub struct Jitter {
    rng: Mutex<StdRng>,
}

impl Jitter {
    /// Reproducible source
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Source seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded when a seed is configured, entropy otherwise
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Run `f` with exclusive access to the generator
    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut self.rng.lock())
    }
}

/// Outcome of the decision rules, before jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// A rule matched: `confidence = base + U[0, spread)`
    Class {
        label: ClassLabel,
        base: f32,
        spread: f32,
    },
    /// No rule matched: uniform over the geological classes
    AnyGeological,
}

impl Decision {
    const DEFAULT_BASE: f32 = 0.65;
    const DEFAULT_SPREAD: f32 = 0.20;

    fn class(label: ClassLabel, base: f32, spread: f32) -> Self {
        Self::Class {
            label,
            base,
            spread,
        }
    }

    /// Resolve randomness into a primary label and confidence
    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> (ClassLabel, f32) {
        match self {
            Self::Class {
                label,
                base,
                spread,
            } => (label, base + rng.gen::<f32>() * spread),
            Self::AnyGeological => {
                let index = rng.gen_range(0..5);
                let label = ClassLabel::from_index(index).unwrap_or(ClassLabel::FairyChimneys);
                (label, Self::DEFAULT_BASE + rng.gen::<f32>() * Self::DEFAULT_SPREAD)
            }
        }
    }
}

/// Apply the decision rules top-down; the first matching branch wins
pub fn decide(f: &FeatureVector) -> Decision {
    let profile = &f.color_profile;

    if f.has_rock && (f.dominant_hue == DominantHue::Brown || profile.brown > 0.15) {
        if f.texture_complexity > 0.18 && f.brightness < 0.6 {
            Decision::class(ClassLabel::FairyChimneys, 0.83, 0.10)
        } else if profile.brown > 0.2 {
            Decision::class(ClassLabel::DivlitVolcanicCones, 0.81, 0.12)
        } else {
            Decision::class(ClassLabel::LavaFlows, 0.78, 0.12)
        }
    } else if f.dominant_hue == DominantHue::Gray && f.has_rock {
        if f.texture_complexity > 0.2 && f.contrast > 0.4 {
            Decision::class(ClassLabel::BasaltColumns, 0.86, 0.08)
        } else {
            Decision::class(ClassLabel::AcisuOphiolites, 0.77, 0.13)
        }
    } else if f.has_building && (f.dominant_hue == DominantHue::Gray || profile.gray > 0.2) {
        if f.brightness > 0.5 && f.saturation < 0.3 {
            Decision::class(ClassLabel::KursunluMosque, 0.85, 0.09)
        } else {
            Decision::class(ClassLabel::HistoricKulaHouses, 0.82, 0.11)
        }
    } else if f.has_green && f.has_sky {
        if f.brightness > 0.55 && profile.blue > 0.1 {
            Decision::class(ClassLabel::ThermalSprings, 0.76, 0.14)
        } else {
            Decision::class(ClassLabel::InformationPanels, 0.73, 0.15)
        }
    } else if f.dominant_hue == DominantHue::Blue && f.has_sky {
        Decision::class(ClassLabel::InformationPanels, 0.70, 0.17)
    } else {
        Decision::AnyGeological
    }
}

/// Synthesize a 9-way score, keep the top 3 and renormalize them to 100
pub fn rank<R: Rng + ?Sized>(
    primary: ClassLabel,
    confidence: f32,
    rng: &mut R,
) -> Vec<ClassificationEntry> {
    let mut scores: Vec<(ClassLabel, u32)> = ClassLabel::ALL
        .iter()
        .map(|&label| {
            if label == primary {
                return (label, percent(confidence));
            }
            let (base, variance) = if primary.is_related_to(label) {
                (0.12, 0.12)
            } else {
                (0.04, 0.08)
            };
            (label, percent(base + rng.gen::<f32>() * variance))
        })
        .collect();

    // stable: equal scores keep label order
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    scores.truncate(TOP_K);

    let raw: Vec<u32> = scores.iter().map(|(_, s)| *s).collect();
    renormalize(&raw)
        .into_iter()
        .zip(scores)
        .map(|(pct, (label, _))| ClassificationEntry::new(label, pct))
        .collect()
}

/// Scale scores so they sum to exactly 100
///
/// Input must be sorted descending. The rounding remainder lands on the
/// first entry; a tie between the trailing entries is split by one point so
/// the output is strictly descending.
pub fn renormalize(scores: &[u32]) -> Vec<u32> {
    let total: u32 = scores.iter().sum();
    if total == 0 {
        return scores.to_vec();
    }

    let mut pct: Vec<i64> = scores
        .iter()
        .map(|&s| (s as f64 * 100.0 / total as f64).round() as i64)
        .collect();

    let remainder = 100 - pct.iter().sum::<i64>();
    pct[0] += remainder;

    let n = pct.len();
    if n >= 3 && pct[n - 2] == pct[n - 1] && pct[n - 1] > 0 {
        pct[n - 2] += 1;
        pct[n - 1] -= 1;
    }

    pct.into_iter().map(|p| p.clamp(0, 100) as u32).collect()
}

fn percent(value: f32) -> u32 {
    (value * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Classify from features alone with a caller-supplied generator
pub fn classify_with<R: Rng + ?Sized>(
    features: &FeatureVector,
    rng: &mut R,
) -> IdentificationResult {
    let decision = decide(features);
    let (label, confidence) = decision.resolve(rng);
    let classes = rank(label, confidence, rng);
    tracing::debug!(
        ?decision,
        label = %label,
        confidence,
        "heuristic classification"
    );
    IdentificationResult::for_label(label, confidence, classes)
}

/// Heuristic classifier bound to a jitter source
pub struct HeuristicClassifier {
    jitter: Jitter,
}

impl HeuristicClassifier {
    /// Create a new heuristic classifier
    pub fn new(jitter: Jitter) -> Self {
        Self { jitter }
    }

    /// Classify a feature vector
    pub fn classify(&self, features: &FeatureVector) -> IdentificationResult {
        self.jitter.with(|rng| classify_with(features, rng))
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new(Jitter::from_entropy())
    }
}
