use serde::{Deserialize, Serialize};

/// Un punto clave de la mano: coordenadas normalizadas a [0,1] respecto al frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "LandmarkRepr", into = "[f32; 3]")]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Formas aceptadas en la entrada: `[x, y, z]` o `{"x": .., "y": .., "z": ..}`
#[derive(Deserialize)]
#[serde(untagged)]
enum LandmarkRepr {
    Array([f32; 3]),
    Object {
        x: f32,
        y: f32,
        #[serde(default)]
        z: f32,
    },
}

impl From<LandmarkRepr> for Landmark {
    fn from(repr: LandmarkRepr) -> Self {
        match repr {
            LandmarkRepr::Array(xyz) => xyz.into(),
            LandmarkRepr::Object { x, y, z } => Self { x, y, z },
        }
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Landmark> for [f32; 3] {
    fn from(lm: Landmark) -> Self {
        [lm.x, lm.y, lm.z]
    }
}

/// Los 21 puntos de una mano detectada en un frame
pub type LandmarkSet = Vec<Landmark>;

/// Vector plano [x0, y0, z0, x1, y1, z1, ...] que consume el clasificador
pub type FeatureVector = Vec<f32>;

/// Resultado del clasificador por encima del umbral de confianza
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label_id: usize,
    pub confidence: f32,
}

/// Constantes del sistema
pub const NUM_LANDMARKS: usize = 21;
pub const COORDS_PER_LANDMARK: usize = 3;
pub const FEATURE_LEN: usize = NUM_LANDMARKS * COORDS_PER_LANDMARK; // 63
pub const HIDDEN_LAYERS: [usize; 3] = [128, 64, 32];
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.70;
pub const DEFAULT_DEBOUNCE_SECS: f32 = 1.5;
pub const UNKNOWN_GESTURE: &str = "unknown";
