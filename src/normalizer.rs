use tracing::debug;

use crate::types::{FeatureVector, Landmark, COORDS_PER_LANDMARK, FEATURE_LEN, NUM_LANDMARKS};

/// Aplana un conjunto de landmarks en orden de punto.
///
/// `None` representa "no hay mano en este frame": entrada ausente, vacía o con
/// un número de puntos distinto de 21. No es un error.
pub fn normalize(landmarks: Option<&[Landmark]>) -> Option<FeatureVector> {
    let landmarks = landmarks?;
    if landmarks.is_empty() {
        return None;
    }
    if landmarks.len() != NUM_LANDMARKS {
        debug!(
            points = landmarks.len(),
            expected = NUM_LANDMARKS,
            "conjunto de landmarks descartado"
        );
        return None;
    }

    let mut features = Vec::with_capacity(FEATURE_LEN);
    for lm in landmarks {
        features.extend_from_slice(&[lm.x, lm.y, lm.z]);
    }
    debug_assert_eq!(features.len(), NUM_LANDMARKS * COORDS_PER_LANDMARK);
    Some(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(offset: f32) -> Vec<Landmark> {
        (0..NUM_LANDMARKS)
            .map(|i| Landmark::new(offset + i as f32 * 0.01, 0.5, -0.1))
            .collect()
    }

    #[test]
    fn test_output_length_is_three_times_points() {
        let features = normalize(Some(hand(0.0).as_slice())).unwrap();
        assert_eq!(features.len(), FEATURE_LEN);
    }

    #[test]
    fn test_row_major_order() {
        let set = hand(0.2);
        let features = normalize(Some(set.as_slice())).unwrap();
        assert_eq!(features[0], set[0].x);
        assert_eq!(features[1], set[0].y);
        assert_eq!(features[2], set[0].z);
        assert_eq!(features[3], set[1].x);
        assert_eq!(features[62], set[20].z);
    }

    #[test]
    fn test_missing_or_empty_is_no_observation() {
        assert!(normalize(None).is_none());
        let empty: &[Landmark] = &[];
        assert!(normalize(Some(empty)).is_none());
    }

    #[test]
    fn test_wrong_cardinality_is_no_observation() {
        let mut set = hand(0.0);
        set.pop();
        assert!(normalize(Some(set.as_slice())).is_none());
    }
}
