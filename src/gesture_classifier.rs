use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dataset::Sample;
use crate::persist;
use crate::types::{Prediction, DEFAULT_CONFIDENCE_THRESHOLD, FEATURE_LEN, HIDDEN_LAYERS};

const ARTIFACT_VERSION: u32 = 1;

/// Clases de salida cuando todavía no hay dataset del que sacar el ancho
pub const DEFAULT_NUM_CLASSES: usize = 5;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No se pudo cargar el modelo {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("No se pudo guardar el modelo {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid feature size: expected {expected}, got {actual}")]
    InvalidFeatureSize { expected: usize, actual: usize },

    #[error("No hay muestras para entrenar")]
    EmptyDataset,

    #[error("Etiqueta {label} fuera de rango para {num_classes} clases")]
    LabelOutOfRange { label: usize, num_classes: usize },
}

/// Lo único que el pipeline necesita de un clasificador
pub trait Classifier {
    /// `None` si no hay ninguna clase por encima del umbral de confianza.
    fn predict(&self, features: &[f32]) -> Option<Prediction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Softmax,
}

/// Capa densa; `weights` está en orden [salida][entrada]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    inputs: usize,
    outputs: usize,
    activation: Activation,
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl DenseLayer {
    fn new<R: Rng>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        // He uniforme
        let limit = (6.0 / inputs.max(1) as f32).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self {
            inputs,
            outputs,
            activation,
            weights,
            biases: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out: Vec<f32> = self
            .biases
            .iter()
            .enumerate()
            .map(|(o, b)| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                b + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>()
            })
            .collect();

        match self.activation {
            Activation::Relu => out.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax_in_place(&mut out),
        }
        out
    }
}

fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

/// Forma persistida del modelo
#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    version: u32,
    input_dim: usize,
    num_classes: usize,
    layers: Vec<DenseLayer>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 16,
            learning_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EpochStats {
    pub loss: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epochs: Vec<EpochStats>,
}

impl TrainingReport {
    pub fn final_accuracy(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.accuracy)
    }
}

/// Perceptrón multicapa 63 → 128 → 64 → 32 → N con softmax a la salida
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    layers: Vec<DenseLayer>,
    threshold: f32,
}

impl GestureClassifier {
    /// Modelo nuevo sin entrenar con `num_classes` salidas
    pub fn create(num_classes: usize) -> Self {
        let mut rng = rand::thread_rng();
        let mut layers = Vec::with_capacity(HIDDEN_LAYERS.len() + 1);
        let mut inputs = FEATURE_LEN;
        for &width in &HIDDEN_LAYERS {
            layers.push(DenseLayer::new(inputs, width, Activation::Relu, &mut rng));
            inputs = width;
        }
        layers.push(DenseLayer::new(
            inputs,
            num_classes,
            Activation::Softmax,
            &mut rng,
        ));

        Self {
            layers,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map(|l| l.outputs).unwrap_or(0)
    }

    /// Anchos de capa de la entrada a la salida, p. ej. `[63, 128, 64, 32, 5]`
    pub fn architecture(&self) -> Vec<usize> {
        let mut widths = vec![self.layers.first().map(|l| l.inputs).unwrap_or(FEATURE_LEN)];
        widths.extend(self.layers.iter().map(|l| l.outputs));
        widths
    }

    /// Restaura un modelo guardado; falla si su salida no tiene `expected_classes` clases.
    pub fn load(path: impl AsRef<Path>, expected_classes: usize) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let load_err = |reason: String| ModelError::Load {
            path: path.to_owned(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))?;

        if artifact.version != ARTIFACT_VERSION {
            return Err(load_err(format!("versión {} no soportada", artifact.version)));
        }
        Self::validate_layers(&artifact).map_err(load_err)?;
        if artifact.num_classes != expected_classes {
            return Err(load_err(format!(
                "el modelo tiene {} clases y el dataset {}",
                artifact.num_classes, expected_classes
            )));
        }

        info!(path = %path.display(), classes = artifact.num_classes, "✅ Modelo cargado");
        Ok(Self {
            layers: artifact.layers,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        })
    }

    /// Carga el modelo o, si no se puede, crea uno nuevo con la arquitectura por defecto.
    pub fn load_or_create(path: impl AsRef<Path>, num_classes: usize) -> Self {
        let path = path.as_ref();
        let num_classes = if num_classes == 0 {
            DEFAULT_NUM_CLASSES
        } else {
            num_classes
        };

        match Self::load(path, num_classes) {
            Ok(model) => model,
            Err(e) => {
                if path.exists() {
                    warn!("⚠️  {}; se crea un modelo nuevo", e);
                } else {
                    info!("No hay modelo entrenado; se crea uno nuevo ({} clases)", num_classes);
                }
                Self::create(num_classes)
            }
        }
    }

    fn validate_layers(artifact: &ModelArtifact) -> Result<(), String> {
        if artifact.input_dim != FEATURE_LEN {
            return Err(format!(
                "entrada de {} valores, se esperaban {}",
                artifact.input_dim, FEATURE_LEN
            ));
        }
        let last = artifact
            .layers
            .last()
            .ok_or_else(|| "el modelo no tiene capas".to_string())?;
        if last.activation != Activation::Softmax || last.outputs != artifact.num_classes {
            return Err("la capa de salida no coincide con num_classes".to_string());
        }

        let mut inputs = artifact.input_dim;
        for (idx, layer) in artifact.layers.iter().enumerate() {
            if layer.inputs != inputs
                || layer.weights.len() != layer.inputs * layer.outputs
                || layer.biases.len() != layer.outputs
            {
                return Err(format!("la capa {} tiene dimensiones inconsistentes", idx));
            }
            inputs = layer.outputs;
        }
        Ok(())
    }

    /// Guarda los parámetros sin dejar nunca un artefacto a medias
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let artifact = ModelArtifact {
            version: ARTIFACT_VERSION,
            input_dim: FEATURE_LEN,
            num_classes: self.num_classes(),
            layers: self.layers.clone(),
        };
        persist::write_json_atomic(path, &artifact).map_err(|source| ModelError::Save {
            path: path.to_owned(),
            source,
        })?;
        info!(path = %path.display(), "💾 Modelo guardado");
        Ok(())
    }

    /// Distribución de probabilidad completa sobre las clases
    pub fn predict_scores(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        if features.len() != FEATURE_LEN {
            return Err(ModelError::InvalidFeatureSize {
                expected: FEATURE_LEN,
                actual: features.len(),
            });
        }
        Ok(self
            .layers
            .iter()
            .fold(features.to_vec(), |acc, layer| layer.forward(&acc)))
    }

    /// Entrena un modelo nuevo con Adam sobre entropía cruzada categórica.
    pub fn train(
        samples: &[Sample],
        num_classes: usize,
        params: TrainingParams,
    ) -> Result<(Self, TrainingReport), ModelError> {
        if samples.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        for sample in samples {
            if sample.landmarks.len() != FEATURE_LEN {
                return Err(ModelError::InvalidFeatureSize {
                    expected: FEATURE_LEN,
                    actual: sample.landmarks.len(),
                });
            }
            if sample.label >= num_classes {
                return Err(ModelError::LabelOutOfRange {
                    label: sample.label,
                    num_classes,
                });
            }
        }

        let mut model = Self::create(num_classes);
        let mut optimizer = Adam::new(&model.layers, params.learning_rate);
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut rng = rand::thread_rng();
        let mut report = TrainingReport::default();
        let batch_size = params.batch_size.max(1);

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut total_loss = 0.0;
            let mut correct = 0usize;

            for batch in order.chunks(batch_size) {
                let mut grads = Gradients::zeros(&model.layers);
                for &idx in batch {
                    let sample = &samples[idx];
                    let (loss, hit) = model.backprop(sample, &mut grads);
                    total_loss += loss;
                    correct += hit as usize;
                }
                grads.scale(1.0 / batch.len() as f32);
                optimizer.step(&mut model.layers, &grads);
            }

            let stats = EpochStats {
                loss: total_loss / samples.len() as f32,
                accuracy: correct as f32 / samples.len() as f32,
            };
            debug!(
                epoch = epoch + 1,
                loss = stats.loss,
                accuracy = stats.accuracy,
                "época completada"
            );
            report.epochs.push(stats);
        }

        Ok((model, report))
    }

    /// Acumula en `grads` el gradiente de una muestra; devuelve (pérdida, acierto).
    fn backprop(&self, sample: &Sample, grads: &mut Gradients) -> (f32, bool) {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(sample.landmarks.clone());
        for layer in &self.layers {
            let next = layer.forward(activations.last().map(Vec::as_slice).unwrap_or(&[]));
            activations.push(next);
        }

        let probs = &activations[self.layers.len()];
        let loss = -probs[sample.label].max(1e-7).ln();
        let hit = argmax(probs).map(|(idx, _)| idx) == Some(sample.label);

        // softmax + entropía cruzada: delta = p - y
        let mut delta = probs.clone();
        delta[sample.label] -= 1.0;

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let input = &activations[l];
            let grad = &mut grads.layers[l];

            for o in 0..layer.outputs {
                grad.biases[o] += delta[o];
                let row = &mut grad.weights[o * layer.inputs..(o + 1) * layer.inputs];
                for (g, x) in row.iter_mut().zip(input) {
                    *g += delta[o] * x;
                }
            }

            if l > 0 {
                let mut prev = vec![0.0; layer.inputs];
                for o in 0..layer.outputs {
                    let row = &layer.weights[o * layer.inputs..(o + 1) * layer.inputs];
                    for (p, w) in prev.iter_mut().zip(row) {
                        *p += w * delta[o];
                    }
                }
                // derivada de ReLU sobre la salida de la capa anterior
                for (p, a) in prev.iter_mut().zip(input) {
                    if *a <= 0.0 {
                        *p = 0.0;
                    }
                }
                delta = prev;
            }
        }

        (loss, hit)
    }
}

impl Classifier for GestureClassifier {
    fn predict(&self, features: &[f32]) -> Option<Prediction> {
        let scores = match self.predict_scores(features) {
            Ok(scores) => scores,
            Err(e) => {
                warn!("❌ Error clasificando: {}", e);
                return None;
            }
        };

        let (label_id, confidence) = argmax(&scores)?;
        if confidence > self.threshold {
            Some(Prediction {
                label_id,
                confidence,
            })
        } else {
            debug!(label_id, confidence, "confianza baja");
            None
        }
    }
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

#[derive(Clone)]
struct LayerGrad {
    weights: Vec<f32>,
    biases: Vec<f32>,
}

struct Gradients {
    layers: Vec<LayerGrad>,
}

impl Gradients {
    fn zeros(layers: &[DenseLayer]) -> Self {
        Self {
            layers: layers
                .iter()
                .map(|l| LayerGrad {
                    weights: vec![0.0; l.weights.len()],
                    biases: vec![0.0; l.biases.len()],
                })
                .collect(),
        }
    }

    fn scale(&mut self, factor: f32) {
        for layer in &mut self.layers {
            layer.weights.iter_mut().for_each(|g| *g *= factor);
            layer.biases.iter_mut().for_each(|g| *g *= factor);
        }
    }
}

/// Optimizador Adam con los hiperparámetros habituales (β1=0.9, β2=0.999)
struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    step: i32,
    m: Gradients,
    v: Gradients,
}

impl Adam {
    fn new(layers: &[DenseLayer], lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            step: 0,
            m: Gradients::zeros(layers),
            v: Gradients::zeros(layers),
        }
    }

    fn step(&mut self, layers: &mut [DenseLayer], grads: &Gradients) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let (lr, b1, b2, eps) = (self.lr, self.beta1, self.beta2, self.eps);

        let update = |param: &mut [f32], grad: &[f32], m: &mut [f32], v: &mut [f32]| {
            for i in 0..param.len() {
                m[i] = b1 * m[i] + (1.0 - b1) * grad[i];
                v[i] = b2 * v[i] + (1.0 - b2) * grad[i] * grad[i];
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                param[i] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        };

        for (l, layer) in layers.iter_mut().enumerate() {
            let (m, v, g) = (&mut self.m.layers[l], &mut self.v.layers[l], &grads.layers[l]);
            update(&mut layer.weights, &g.weights, &mut m.weights, &mut v.weights);
            update(&mut layer.biases, &g.biases, &mut m.biases, &mut v.biases);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Pesos a cero: la salida es softmax(logits) para cualquier entrada
    fn fixed_output(logits: &[f32]) -> GestureClassifier {
        let mut model = GestureClassifier::create(logits.len());
        for layer in &mut model.layers {
            layer.weights.iter_mut().for_each(|w| *w = 0.0);
        }
        let last = model.layers.last_mut().unwrap();
        last.biases.copy_from_slice(logits);
        model
    }

    fn cluster_sample(label: usize, jitter: f32) -> Sample {
        let base = if label == 0 { 0.2 } else { 0.8 };
        let landmarks = (0..FEATURE_LEN)
            .map(|i| base + jitter * ((i % 7) as f32 - 3.0) * 0.01)
            .collect();
        Sample { label, landmarks }
    }

    #[test]
    fn test_create_architecture() {
        let model = GestureClassifier::create(4);
        let widths: Vec<(usize, usize)> = model.layers.iter().map(|l| (l.inputs, l.outputs)).collect();
        assert_eq!(widths, vec![(63, 128), (128, 64), (64, 32), (32, 4)]);
        assert_eq!(model.layers[3].activation, Activation::Softmax);
        assert_eq!(model.architecture(), vec![63, 128, 64, 32, 4]);
    }

    #[test]
    fn test_scores_are_a_distribution() {
        let model = GestureClassifier::create(3);
        let scores = model.predict_scores(&vec![0.5; FEATURE_LEN]).unwrap();
        assert_eq!(scores.len(), 3);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_feature_size() {
        let model = GestureClassifier::create(3);
        let err = model.predict_scores(&[0.0; 10]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidFeatureSize { expected: 63, actual: 10 }
        ));
        assert!(model.predict(&[0.0; 10]).is_none());
    }

    #[test]
    fn test_confident_prediction_returns_argmax() {
        // softmax([0, 0, 4]) ≈ [0.018, 0.018, 0.964]
        let model = fixed_output(&[0.0, 0.0, 4.0]);
        let prediction = model.predict(&vec![0.3; FEATURE_LEN]).unwrap();
        assert_eq!(prediction.label_id, 2);
        assert!(prediction.confidence > 0.9);
    }

    #[test]
    fn test_low_confidence_returns_none() {
        // softmax([0, 0.5]) ≈ [0.38, 0.62]
        let model = fixed_output(&[0.0, 0.5]);
        assert!(model.predict(&vec![0.3; FEATURE_LEN]).is_none());
    }

    #[test]
    fn test_confidence_equal_to_threshold_is_rejected() {
        let model = fixed_output(&[0.0, 4.0]);
        let confidence = model.predict_scores(&vec![0.3; FEATURE_LEN]).unwrap()[1];
        let model = model.with_threshold(confidence);
        assert!(model.predict(&vec![0.3; FEATURE_LEN]).is_none());
    }

    #[test]
    fn test_save_load_roundtrip_same_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model").join("gesture_model.json");
        let model = GestureClassifier::create(3);
        model.save(&path).unwrap();

        let loaded = GestureClassifier::load(&path, 3).unwrap();
        let input: Vec<f32> = (0..FEATURE_LEN).map(|i| i as f32 / 63.0).collect();
        assert_eq!(
            model.predict_scores(&input).unwrap(),
            loaded.predict_scores(&input).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_class_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gesture_model.json");
        GestureClassifier::create(3).save(&path).unwrap();

        let err = GestureClassifier::load(&path, 4).unwrap_err();
        assert!(matches!(err, ModelError::Load { .. }));
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gesture_model.json");
        assert!(matches!(
            GestureClassifier::load(&path, 3),
            Err(ModelError::Load { .. })
        ));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            GestureClassifier::load(&path, 3),
            Err(ModelError::Load { .. })
        ));
    }

    #[test]
    fn test_load_or_create_falls_back() {
        let dir = TempDir::new().unwrap();
        let model = GestureClassifier::load_or_create(dir.path().join("missing.json"), 0);
        assert_eq!(model.num_classes(), DEFAULT_NUM_CLASSES);
        assert_eq!(model.layers.len(), 4);
    }

    #[test]
    fn test_train_rejects_empty_and_out_of_range() {
        let params = TrainingParams::default();
        assert!(matches!(
            GestureClassifier::train(&[], 2, params),
            Err(ModelError::EmptyDataset)
        ));
        assert!(matches!(
            GestureClassifier::train(&[cluster_sample(1, 0.0)], 1, params),
            Err(ModelError::LabelOutOfRange { label: 1, num_classes: 1 })
        ));
    }

    #[test]
    fn test_train_separates_two_clusters() {
        let samples: Vec<Sample> = (0..40)
            .map(|i| cluster_sample(i % 2, (i / 2) as f32 * 0.1))
            .collect();
        let params = TrainingParams {
            epochs: 30,
            batch_size: 8,
            learning_rate: 0.01,
        };

        let (model, report) = GestureClassifier::train(&samples, 2, params).unwrap();
        assert_eq!(report.epochs.len(), 30);
        assert!(report.final_accuracy().unwrap() > 0.9);

        let scores = model.predict_scores(&cluster_sample(1, 0.05).landmarks).unwrap();
        assert!(scores[1] > scores[0]);
    }
}
