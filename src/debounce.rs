use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Ventana de enfriamiento por gesto.
///
/// Un gesto sostenido dispara una vez por ventana en lugar de una vez por frame.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    window: Duration,
    last_trigger: HashMap<String, Instant>,
}

impl DebounceGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_trigger: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `true` si el gesto puede disparar en `now`; en ese caso se registra el instante.
    /// Las llamadas suprimidas no mueven el registro.
    pub fn check(&mut self, gesture: &str, now: Instant) -> bool {
        if let Some(&last) = self.last_trigger.get(gesture) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                debug!(gesture, ?elapsed, "gesto en enfriamiento");
                return false;
            }
        }
        self.last_trigger.insert(gesture.to_string(), now);
        true
    }

    pub fn reset(&mut self) {
        self.last_trigger.clear();
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(Duration::from_secs_f32(crate::types::DEFAULT_DEBOUNCE_SECS))
    }
}
