use std::time::Instant;
use tracing::{debug, info, warn};

use crate::dataset::LabelSpace;
use crate::dispatcher::{ActionError, DispatchOutcome, Dispatcher};
use crate::gesture_classifier::Classifier;
use crate::normalizer::normalize;
use crate::types::{Landmark, LandmarkSet};

/// Qué pasó con una mano en un frame
#[derive(Debug)]
pub enum FrameOutcome {
    /// No había mano visible
    NoObservation,
    /// Ninguna clase superó el umbral de confianza
    LowConfidence,
    Dispatched {
        gesture: String,
        confidence: f32,
        outcome: DispatchOutcome,
    },
    /// La acción falló; el pipeline sigue con el siguiente frame
    Failed {
        gesture: String,
        error: ActionError,
    },
}

/// landmarks → normalizador → clasificador → nombre → dispatcher
pub struct GesturePipeline<C: Classifier> {
    classifier: C,
    labels: LabelSpace,
    dispatcher: Dispatcher,
}

impl<C: Classifier> GesturePipeline<C> {
    pub fn new(classifier: C, labels: LabelSpace, dispatcher: Dispatcher) -> Self {
        Self {
            classifier,
            labels,
            dispatcher,
        }
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Procesa todas las manos de un frame; un frame sin manos da `NoObservation`.
    pub fn process_frame(&mut self, hands: &[LandmarkSet], now: Instant) -> Vec<FrameOutcome> {
        if hands.is_empty() {
            return vec![self.process_hand(None, now)];
        }
        hands
            .iter()
            .map(|hand| self.process_hand(Some(hand.as_slice()), now))
            .collect()
    }

    pub fn process_hand(&mut self, landmarks: Option<&[Landmark]>, now: Instant) -> FrameOutcome {
        let Some(features) = normalize(landmarks) else {
            return FrameOutcome::NoObservation;
        };
        let Some(prediction) = self.classifier.predict(&features) else {
            return FrameOutcome::LowConfidence;
        };

        let gesture = self.labels.resolve_name(prediction.label_id).to_string();
        debug!(gesture = %gesture, confidence = prediction.confidence, "gesto reconocido");

        match self.dispatcher.dispatch(&gesture, now) {
            Ok(outcome) => {
                if let DispatchOutcome::Executed(_) = outcome {
                    info!(
                        "[GESTO] {} (conf: {:.2}%)",
                        gesture,
                        prediction.confidence * 100.0
                    );
                }
                FrameOutcome::Dispatched {
                    gesture,
                    confidence: prediction.confidence,
                    outcome,
                }
            }
            Err(error) => {
                warn!("❌ Error ejecutando la acción de {}: {}", gesture, error);
                FrameOutcome::Failed { gesture, error }
            }
        }
    }
}
