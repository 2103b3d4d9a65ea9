use serde::Serialize;

use crate::models::{Sample, EMOTION_LABELS};

const FALLBACK_ADVICE: &str = "Observe more sessions before drawing conclusions about interest.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionShare {
    pub label: &'static str,
    pub count: usize,
    pub share: f64,
}

/// Label distribution of one session's samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionMix {
    pub total: usize,
    pub shares: Vec<EmotionShare>,
    pub dominant: Option<&'static str>,
}

impl EmotionMix {
    pub fn advice(&self) -> &'static str {
        self.dominant.map(emotion_advice).unwrap_or(FALLBACK_ADVICE)
    }
}

pub fn emotion_mix(samples: &[Sample]) -> EmotionMix {
    let total = samples.len();
    let shares: Vec<EmotionShare> = EMOTION_LABELS
        .iter()
        .map(|&label| {
            let count = samples.iter().filter(|s| s.emotion == label).count();
            EmotionShare {
                label,
                count,
                share: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
            }
        })
        .collect();

    // Ties go to the label listed first.
    let dominant = shares
        .iter()
        .filter(|s| s.count > 0)
        .fold(None::<&EmotionShare>, |best, s| match best {
            Some(b) if b.count >= s.count => Some(b),
            _ => Some(s),
        })
        .map(|s| s.label);

    EmotionMix {
        total,
        shares,
        dominant,
    }
}

pub fn emotion_advice(label: &str) -> &'static str {
    match label {
        "Happy" => "Engaged with the current activity; extend related topics to keep the motivation going.",
        "Sad" => "May be frustrated by the material; try reintroducing it through stories or games.",
        "Angry" => "Showing strong frustration; pause and offer positive feedback before continuing.",
        _ => FALLBACK_ADVICE,
    }
}
