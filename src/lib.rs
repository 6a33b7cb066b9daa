//! quirocontrol: reconocimiento de gestos de mano en tiempo real.
//!
//! Por cada frame el detector externo entrega 0..n manos de 21 landmarks;
//! cada mano pasa por normalizador → clasificador (MLP con umbral de
//! confianza) → dispatcher (enfriamiento por gesto + registro de acciones) →
//! pulsación simulada o comando de shell.

pub mod actions;
pub mod config;
pub mod dataset;
pub mod debounce;
pub mod dispatcher;
pub mod gesture_classifier;
pub mod hid;
pub mod normalizer;
pub mod persist;
pub mod pipeline;
pub mod shell;
pub mod source;
pub mod types;

pub use actions::{ActionDescriptor, ActionRegistry, SystemAction};
pub use config::Config;
pub use dataset::{DatasetStore, LabelSpace, Sample};
pub use debounce::DebounceGate;
pub use dispatcher::{ActionError, DispatchOutcome, Dispatcher};
pub use gesture_classifier::{Classifier, GestureClassifier, ModelError, TrainingParams};
pub use pipeline::{FrameOutcome, GesturePipeline};
