use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uinput::device::Device;
use uinput::event::keyboard;

#[derive(Error, Debug)]
pub enum HidError {
    #[error("uinput: {0}")]
    Uinput(#[from] uinput::Error),

    #[error("Salida HID no disponible: {0}")]
    Unavailable(String),
}

/// Teclas que pueden simular las acciones de sistema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimKey {
    VolumeUp,
    VolumeDown,
    Right,
    Left,
    Enter,
    Space,
}

/// Primitiva de simulación de entrada
pub trait KeyInjector {
    fn tap(&mut self, key: SimKey) -> Result<(), HidError>;
}

/// Teclado virtual sobre /dev/uinput
pub struct HidOutput {
    dev: Device,
    press_delay: Duration,
}

impl HidOutput {
    pub fn new(press_delay: Duration) -> Result<Self, HidError> {
        let dev = uinput::default()?
            .name("quirocontrol-hid")?
            .event(uinput::event::Keyboard::All)?
            .create()?;

        info!("✅ HID inicializado (/dev/uinput)");
        Ok(HidOutput { dev, press_delay })
    }

    fn sync(&mut self) -> Result<(), uinput::Error> {
        self.dev.synchronize()
    }

    fn key_tap(&mut self, key: keyboard::Keyboard) -> Result<(), uinput::Error> {
        self.dev.press(&key)?;
        self.sync()?;
        std::thread::sleep(self.press_delay);
        self.dev.release(&key)?;
        self.sync()
    }
}

fn to_uinput(key: SimKey) -> keyboard::Keyboard {
    match key {
        SimKey::VolumeUp => keyboard::Keyboard::Misc(keyboard::Misc::VolumeUp),
        SimKey::VolumeDown => keyboard::Keyboard::Misc(keyboard::Misc::VolumeDown),
        SimKey::Right => keyboard::Keyboard::Key(keyboard::Key::Right),
        SimKey::Left => keyboard::Keyboard::Key(keyboard::Key::Left),
        SimKey::Enter => keyboard::Keyboard::Key(keyboard::Key::Enter),
        SimKey::Space => keyboard::Keyboard::Key(keyboard::Key::Space),
    }
}

impl KeyInjector for HidOutput {
    fn tap(&mut self, key: SimKey) -> Result<(), HidError> {
        self.key_tap(to_uinput(key))?;
        Ok(())
    }
}

/// Se usa cuando /dev/uinput no se pudo abrir: cada pulsación falla
/// pero el pipeline sigue funcionando (los comandos de shell no dependen de HID).
pub struct UnavailableInput {
    reason: String,
}

impl UnavailableInput {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl KeyInjector for UnavailableInput {
    fn tap(&mut self, _key: SimKey) -> Result<(), HidError> {
        Err(HidError::Unavailable(self.reason.clone()))
    }
}
