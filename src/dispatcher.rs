use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::actions::{ActionDescriptor, ActionRegistry, RegistryError, SystemAction};
use crate::debounce::DebounceGate;
use crate::hid::{HidError, KeyInjector, SimKey};
use crate::shell::{CommandRunner, ShellError};

/// Fallo al ejecutar la acción de un gesto. Nunca detiene el bucle de frames.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Error enviando pulsación: {0}")]
    Input(#[from] HidError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Resultado normal de un intento de disparo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// El gesto sigue en su ventana de enfriamiento
    Suppressed,
    /// El gesto no tiene acción asignada
    Unmapped,
    Executed(ActionDescriptor),
}

/// Secuencia de teclas de cada acción de sistema
pub fn key_sequence(action: SystemAction) -> &'static [SimKey] {
    match action {
        SystemAction::VolumeUp => &[SimKey::VolumeUp; 3],
        SystemAction::VolumeDown => &[SimKey::VolumeDown; 3],
        SystemAction::Right => &[SimKey::Right],
        SystemAction::Left => &[SimKey::Left],
        SystemAction::Ok => &[SimKey::Enter],
        SystemAction::Space => &[SimKey::Space],
        SystemAction::Fist => &[],
    }
}

pub struct Dispatcher {
    gate: DebounceGate,
    registry: ActionRegistry,
    keys: Box<dyn KeyInjector>,
    shell: Box<dyn CommandRunner>,
}

impl Dispatcher {
    pub fn new(
        gate: DebounceGate,
        registry: ActionRegistry,
        keys: Box<dyn KeyInjector>,
        shell: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            gate,
            registry,
            keys,
            shell,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn gate_mut(&mut self) -> &mut DebounceGate {
        &mut self.gate
    }

    /// Enfriamiento → registro → ejecución.
    ///
    /// Suprimido y sin asignar son resultados `Ok`; solo los fallos de
    /// lectura del registro o de ejecución son `Err`.
    pub fn dispatch(&mut self, gesture: &str, now: Instant) -> Result<DispatchOutcome, ActionError> {
        if !self.gate.check(gesture, now) {
            return Ok(DispatchOutcome::Suppressed);
        }

        let Some(descriptor) = self.registry.get(gesture)? else {
            debug!(gesture, "gesto sin acción asignada");
            return Ok(DispatchOutcome::Unmapped);
        };

        info!(gesture, action = %descriptor, "🎮 Ejecutando acción");
        self.execute(&descriptor)?;
        Ok(DispatchOutcome::Executed(descriptor))
    }

    fn execute(&mut self, descriptor: &ActionDescriptor) -> Result<(), ActionError> {
        match descriptor {
            ActionDescriptor::System(action) => {
                for &key in key_sequence(*action) {
                    self.keys.tap(key)?;
                }
                Ok(())
            }
            ActionDescriptor::Shell(command) => Ok(self.shell.run(command)?),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingKeys, RecordingShell};
    use super::*;
    use crate::hid::UnavailableInput;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        keys: RecordingKeys,
        shell: RecordingShell,
        dispatcher: Dispatcher,
    }

    fn fixture_with_shell(shell: RecordingShell) -> Fixture {
        let dir = TempDir::new().unwrap();
        let registry = ActionRegistry::open(dir.path().join("gesture_commands.json")).unwrap();
        let keys = RecordingKeys::default();
        let dispatcher = Dispatcher::new(
            DebounceGate::new(Duration::from_secs_f32(1.5)),
            registry,
            Box::new(keys.clone()),
            Box::new(shell.clone()),
        );
        Fixture {
            _dir: dir,
            keys,
            shell,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_shell(RecordingShell::default())
    }

    fn set(f: &Fixture, gesture: &str, action: &str) {
        f.dispatcher
            .registry()
            .set(gesture, ActionDescriptor::parse(action))
            .unwrap();
    }

    #[test]
    fn test_volume_up_presses_three_times() {
        let mut f = fixture();
        set(&f, "fist", "volumeup");

        let outcome = f.dispatcher.dispatch("fist", Instant::now()).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Executed(ActionDescriptor::System(SystemAction::VolumeUp))
        );
        assert_eq!(*f.keys.pressed.lock().unwrap(), vec![SimKey::VolumeUp; 3]);
    }

    #[test]
    fn test_key_sequences() {
        assert_eq!(key_sequence(SystemAction::VolumeDown).len(), 3);
        assert_eq!(key_sequence(SystemAction::Ok), &[SimKey::Enter]);
        assert_eq!(key_sequence(SystemAction::Space), &[SimKey::Space]);
        assert!(key_sequence(SystemAction::Fist).is_empty());
    }

    #[test]
    fn test_unmapped_gesture() {
        let mut f = fixture();
        let outcome = f.dispatcher.dispatch("wave", Instant::now()).unwrap();
        assert_eq!(outcome, DispatchOutcome::Unmapped);
        assert!(f.keys.pressed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_held_gesture_is_suppressed_until_window_passes() {
        let mut f = fixture();
        set(&f, "palm", "right");
        let t0 = Instant::now();

        assert!(matches!(
            f.dispatcher.dispatch("palm", t0).unwrap(),
            DispatchOutcome::Executed(_)
        ));
        assert_eq!(
            f.dispatcher.dispatch("palm", t0 + Duration::from_secs(1)).unwrap(),
            DispatchOutcome::Suppressed
        );
        assert!(matches!(
            f.dispatcher.dispatch("palm", t0 + Duration::from_secs(2)).unwrap(),
            DispatchOutcome::Executed(_)
        ));
        assert_eq!(*f.keys.pressed.lock().unwrap(), vec![SimKey::Right; 2]);
    }

    #[test]
    fn test_shell_command_receives_verbatim_text() {
        let mut f = fixture();
        set(&f, "peace", "notify-send 'paz y amor'");

        f.dispatcher.dispatch("peace", Instant::now()).unwrap();
        assert_eq!(
            *f.shell.commands.lock().unwrap(),
            vec!["notify-send 'paz y amor'".to_string()]
        );
    }

    #[test]
    fn test_failed_command_is_reported_and_next_dispatch_works() {
        let mut f = fixture_with_shell(RecordingShell {
            fail_with: Some(1),
            ..Default::default()
        });
        set(&f, "peace", "false");
        set(&f, "palm", "left");
        let t0 = Instant::now();

        let err = f.dispatcher.dispatch("peace", t0).unwrap_err();
        assert!(matches!(err, ActionError::Shell(ShellError::ExitStatus { .. })));

        f.dispatcher.dispatch("palm", t0).unwrap();
        assert_eq!(*f.keys.pressed.lock().unwrap(), vec![SimKey::Left]);
    }

    #[test]
    fn test_unavailable_hid_is_action_error() {
        let dir = TempDir::new().unwrap();
        let registry = ActionRegistry::open(dir.path().join("cmds.json")).unwrap();
        registry.set("ok_sign", ActionDescriptor::parse("ok")).unwrap();
        let mut dispatcher = Dispatcher::new(
            DebounceGate::default(),
            registry,
            Box::new(UnavailableInput::new("sin /dev/uinput")),
            Box::new(RecordingShell::default()),
        );

        let err = dispatcher.dispatch("ok_sign", Instant::now()).unwrap_err();
        assert!(matches!(err, ActionError::Input(HidError::Unavailable(_))));
    }
}
