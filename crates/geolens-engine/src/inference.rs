//! Forward pass and top-k extraction

use crate::lifecycle::LoadedModel;
use crate::preprocess;
use geolens_core::{
    ClassLabel, ClassificationEntry, Error, IdentificationResult, Result, NUM_CLASSES,
};
use image::DynamicImage;

/// Number of ranked entries taken from the probability vector
pub const TOP_K: usize = 3;

/// Result of one model-path attempt
#[derive(Debug)]
pub enum InferenceOutcome {
    Ok(IdentificationResult),
    /// The model could not produce a usable result; the reason is logged and
    /// the caller switches to the heuristic path
    Fallback(Error),
}

impl InferenceOutcome {
    fn from_result(result: Result<IdentificationResult>) -> Self {
        match result {
            Ok(result) => Self::Ok(result),
            Err(e) => Self::Fallback(e),
        }
    }
}

/// Preprocess `image`, run the model and rank its output
///
/// Blocking; call from a blocking-capable thread.
pub fn infer(model: &LoadedModel, image: &DynamicImage) -> InferenceOutcome {
    InferenceOutcome::from_result(run(model, image))
}

fn run(model: &LoadedModel, image: &DynamicImage) -> Result<IdentificationResult> {
    let input = preprocess::to_input_tensor(image, &model.device)?;
    let output = model.model.forward(&input)?;
    let scores: Vec<f32> = output
        .flatten_all()
        .and_then(|t| t.to_dtype(candle_core::DType::F32))
        .and_then(|t| t.to_vec1())
        .map_err(|e| Error::inference(format!("failed to read model output: {}", e)))?;
    rank_scores(&scores)
}

/// Turn a raw output vector into a ranked result
pub fn rank_scores(scores: &[f32]) -> Result<IdentificationResult> {
    if scores.len() != NUM_CLASSES {
        return Err(Error::inference(format!(
            "model produced {} outputs, expected {}",
            scores.len(),
            NUM_CLASSES
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(Error::inference("model output contains non-finite values"));
    }

    let probabilities = if is_probabilities(scores) {
        scores.to_vec()
    } else {
        tracing::debug!("model output has values outside [0, 1], applying softmax");
        softmax(scores)
    };

    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    // stable: ties keep label order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(TOP_K);

    let classes: Vec<ClassificationEntry> = ranked
        .iter()
        .filter_map(|&(index, p)| {
            ClassLabel::from_index(index)
                .map(|label| ClassificationEntry::new(label, (p * 100.0).round() as u32))
        })
        .collect();

    let (top, confidence) = ranked[0];
    let label = ClassLabel::from_index(top)
        .ok_or_else(|| Error::inference(format!("class index {} out of range", top)))?;

    Ok(IdentificationResult::for_label(label, confidence, classes))
}

/// Probability heads (softmax, sigmoid, quantized) are taken as-is; only
/// values outside [0, 1] mark the output as logits
fn is_probabilities(scores: &[f32]) -> bool {
    scores.iter().all(|s| (0.0..=1.0).contains(s))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
