use crate::detection::to_grayscale;
use crate::error::{Error, Result};
use opencv::core::{self, Mat, Scalar, Size};
use opencv::dnn;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// The fixed emotion vocabulary, in the order FER-2013 models emit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence in percent (0 to 100) for every label of [`Emotion::ALL`].
///
/// Serialized as a JSON object keyed by label. Deserializing requires all
/// seven labels to be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Emotion, f64>",
    into = "BTreeMap<Emotion, f64>"
)]
pub struct EmotionDistribution {
    values: [f64; 7],
}

impl EmotionDistribution {
    /// Builds a distribution from percentages in [`Emotion::ALL`] order.
    /// Values are clamped into 0..=100.
    pub fn from_percentages(values: [f64; 7]) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::Classification(format!(
                "non-finite confidence {bad}"
            )));
        }
        Ok(Self {
            values: values.map(|v| v.clamp(0.0, 100.0)),
        })
    }

    /// Builds a distribution from explicit label/percentage pairs, missing labels are 0.
    pub fn from_pairs(pairs: &[(Emotion, f64)]) -> Result<Self> {
        let mut values = [0.0; 7];
        for (emotion, value) in pairs {
            values[emotion.index()] = *value;
        }
        Self::from_percentages(values)
    }

    /// Interprets raw model output: either a probability vector or logits.
    pub fn from_model_output(scores: &[f32]) -> Result<Self> {
        if scores.len() != Emotion::ALL.len() {
            return Err(Error::Classification(format!(
                "expected {} scores, model produced {}",
                Emotion::ALL.len(),
                scores.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(Error::Classification(
                "model produced non-finite score".into(),
            ));
        }

        let sum: f32 = scores.iter().sum();
        let is_probability =
            scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
        let probabilities: Vec<f64> = if is_probability {
            scores.iter().map(|&s| s as f64).collect()
        } else {
            let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let exp: Vec<f64> = scores.iter().map(|&s| ((s - max) as f64).exp()).collect();
            let total: f64 = exp.iter().sum();
            exp.into_iter().map(|e| e / total).collect()
        };

        let mut values = [0.0; 7];
        for (slot, p) in values.iter_mut().zip(probabilities) {
            *slot = p * 100.0;
        }
        Self::from_percentages(values)
    }

    pub fn get(&self, emotion: Emotion) -> f64 {
        self.values[emotion.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().map(|e| (*e, self.values[e.index()]))
    }

    /// Highest-confidence label, ties go to the earlier label.
    pub fn dominant(&self) -> (Emotion, f64) {
        self.iter()
            .fold((Emotion::Angry, f64::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            })
    }
}

impl TryFrom<BTreeMap<Emotion, f64>> for EmotionDistribution {
    type Error = Error;

    fn try_from(map: BTreeMap<Emotion, f64>) -> Result<Self> {
        let mut values = [0.0; 7];
        for emotion in Emotion::ALL {
            values[emotion.index()] = *map.get(&emotion).ok_or_else(|| {
                Error::Classification(format!("missing confidence for {emotion}"))
            })?;
        }
        Self::from_percentages(values)
    }
}

impl From<EmotionDistribution> for BTreeMap<Emotion, f64> {
    fn from(value: EmotionDistribution) -> Self {
        value.iter().collect()
    }
}

/// Turns a cropped face into an [`EmotionDistribution`].
pub trait EmotionClassifier {
    fn classify(&mut self, face: &Mat) -> Result<EmotionDistribution>;
}

/// FER-2013 style ONNX model run through OpenCV's DNN module.
///
/// Expects a single grayscale `1x1xNxN` input scaled to 0..1 and seven
/// outputs in [`Emotion::ALL`] order.
pub struct OnnxEmotionClassifier {
    net: dnn::Net,
    input_size: i32,
}

impl OnnxEmotionClassifier {
    pub fn new(model_path: &Path, input_size: i32) -> Result<Self> {
        if input_size <= 0 {
            return Err(Error::Config(format!(
                "model input size must be positive, got {input_size}"
            )));
        }
        let path = model_path.to_str().ok_or_else(|| {
            Error::ModelLoad(format!("model path {model_path:?} is not valid UTF-8"))
        })?;
        let net = dnn::read_net_from_onnx(path)
            .map_err(|e| Error::ModelLoad(format!("{}: {e}", model_path.display())))?;
        if net.empty()? {
            return Err(Error::ModelLoad(format!(
                "{} contains no layers",
                model_path.display()
            )));
        }
        Ok(Self { net, input_size })
    }

    fn infer(&mut self, face: &Mat) -> Result<EmotionDistribution> {
        let gray = to_grayscale(face)?;
        let blob = dnn::blob_from_image(
            &gray,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            false,
            false,
            core::CV_32F,
        )?;
        self.net.set_input_def(&blob)?;
        let output = self.net.forward_single_def()?;
        let scores = output.data_typed::<f32>()?;
        EmotionDistribution::from_model_output(scores)
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &Mat) -> Result<EmotionDistribution> {
        if face.empty() {
            return Err(Error::Classification("empty face crop".into()));
        }
        self.infer(face).map_err(|e| match e {
            Error::Classification(_) => e,
            other => Error::Classification(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probabilities_are_scaled_to_percent() {
        let dist =
            EmotionDistribution::from_model_output(&[0.0, 0.0, 0.0, 0.75, 0.25, 0.0, 0.0]).unwrap();
        assert!((dist.get(Emotion::Happy) - 75.0).abs() < 1e-4);
        assert!((dist.get(Emotion::Sad) - 25.0).abs() < 1e-4);
        assert_eq!(dist.dominant().0, Emotion::Happy);
    }

    #[test]
    fn logits_go_through_softmax() {
        let dist =
            EmotionDistribution::from_model_output(&[-2.0, 1.0, 0.5, 4.0, 3.0, -1.0, 2.5]).unwrap();
        let total: f64 = dist.iter().map(|(_, v)| v).sum();
        assert!((total - 100.0).abs() < 1e-6);
        for (_, value) in dist.iter() {
            assert!((0.0..=100.0).contains(&value));
        }
        assert_eq!(dist.dominant().0, Emotion::Happy);
    }

    #[test]
    fn wrong_score_count_is_a_classification_error() {
        let err = EmotionDistribution::from_model_output(&[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, Error::Classification(_)));

        let err = EmotionDistribution::from_model_output(&[f32::NAN; 7]).unwrap_err();
        assert!(matches!(err, Error::Classification(_)));
    }

    #[test]
    fn serializes_with_exactly_the_seven_labels() {
        let dist = EmotionDistribution::from_pairs(&[(Emotion::Happy, 95.2), (Emotion::Sad, 1.3)])
            .unwrap();
        let value = serde_json::to_value(&dist).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["angry", "disgust", "fear", "happy", "neutral", "sad", "surprise"]
        );
        assert_eq!(object["happy"], 95.2);
    }

    #[test]
    fn deserializing_requires_every_label() {
        let partial = r#"{"happy": 90.0, "sad": 10.0}"#;
        assert!(serde_json::from_str::<EmotionDistribution>(partial).is_err());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let dist =
            EmotionDistribution::from_pairs(&[(Emotion::Fear, 140.0), (Emotion::Angry, -3.0)])
                .unwrap();
        assert_eq!(dist.get(Emotion::Fear), 100.0);
        assert_eq!(dist.get(Emotion::Angry), 0.0);
    }
}
