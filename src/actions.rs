use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::persist;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No se pudo leer el registro de acciones {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Registro de acciones {path:?} inválido: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No se pudo escribir el registro de acciones {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Acciones de sistema predefinidas (pulsaciones simuladas)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemAction {
    VolumeUp,
    VolumeDown,
    Right,
    Left,
    Ok,
    Space,
    /// Reservada, no hace nada
    Fist,
}

impl SystemAction {
    pub const ALL: [SystemAction; 7] = [
        SystemAction::VolumeUp,
        SystemAction::VolumeDown,
        SystemAction::Right,
        SystemAction::Left,
        SystemAction::Ok,
        SystemAction::Space,
        SystemAction::Fist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemAction::VolumeUp => "volumeup",
            SystemAction::VolumeDown => "volumedown",
            SystemAction::Right => "right",
            SystemAction::Left => "left",
            SystemAction::Ok => "ok",
            SystemAction::Space => "space",
            SystemAction::Fist => "fist",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

/// Lo que se ejecuta cuando un gesto se dispara.
///
/// Se resuelve una sola vez al leer el registro: si el texto coincide con una
/// acción de sistema es `System`, si no se trata como comando de shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionDescriptor {
    System(SystemAction),
    Shell(String),
}

impl ActionDescriptor {
    pub fn parse(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

impl From<String> for ActionDescriptor {
    fn from(text: String) -> Self {
        match SystemAction::from_name(&text) {
            Some(action) => ActionDescriptor::System(action),
            None => ActionDescriptor::Shell(text),
        }
    }
}

impl From<ActionDescriptor> for String {
    fn from(descriptor: ActionDescriptor) -> Self {
        match descriptor {
            ActionDescriptor::System(action) => action.as_str().to_string(),
            ActionDescriptor::Shell(command) => command,
        }
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionDescriptor::System(action) => f.write_str(action.as_str()),
            ActionDescriptor::Shell(command) => f.write_str(command),
        }
    }
}

/// Mapa gesto → acción persistido como `{"gesto": "acción"}`.
///
/// Cada operación lee y reescribe el archivo completo; se asume un único escritor.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    path: PathBuf,
}

impl ActionRegistry {
    /// Abre el registro y lo crea vacío si no existe
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let registry = Self {
            path: path.as_ref().to_path_buf(),
        };
        if !registry.path.exists() {
            registry.write(&BTreeMap::new())?;
            info!(path = %registry.path.display(), "Registro de acciones creado");
        }
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` = gesto sin acción asignada
    pub fn get(&self, gesture: &str) -> Result<Option<ActionDescriptor>, RegistryError> {
        Ok(self.read()?.remove(gesture))
    }

    pub fn set(&self, gesture: &str, descriptor: ActionDescriptor) -> Result<(), RegistryError> {
        let mut entries = self.read()?;
        info!(gesture, action = %descriptor, "Acción asignada");
        entries.insert(gesture.to_string(), descriptor);
        self.write(&entries)
    }

    /// Devuelve si el gesto tenía acción
    pub fn delete(&self, gesture: &str) -> Result<bool, RegistryError> {
        let mut entries = self.read()?;
        if entries.remove(gesture).is_none() {
            return Ok(false);
        }
        self.write(&entries)?;
        info!(gesture, "Acción eliminada");
        Ok(true)
    }

    pub fn list(&self) -> Result<BTreeMap<String, ActionDescriptor>, RegistryError> {
        self.read()
    }

    fn read(&self) -> Result<BTreeMap<String, ActionDescriptor>, RegistryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(RegistryError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, entries: &BTreeMap<String, ActionDescriptor>) -> Result<(), RegistryError> {
        persist::write_json_atomic(&self.path, entries).map_err(|source| RegistryError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> ActionRegistry {
        ActionRegistry::open(dir.path().join("config").join("gesture_commands.json")).unwrap()
    }

    #[test]
    fn test_open_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert_eq!(fs::read_to_string(registry.path()).unwrap(), "{}");
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_set_get_delete_roundtrip() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.set("fist", ActionDescriptor::parse("volumeup")).unwrap();
        assert_eq!(
            registry.get("fist").unwrap(),
            Some(ActionDescriptor::System(SystemAction::VolumeUp))
        );

        assert!(registry.delete("fist").unwrap());
        assert_eq!(registry.get("fist").unwrap(), None);
        assert!(!registry.delete("fist").unwrap());
    }

    #[test]
    fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.set("palm", ActionDescriptor::parse("left")).unwrap();
        registry.set("palm", ActionDescriptor::parse("right")).unwrap();
        assert_eq!(registry.list().unwrap().len(), 1);
        assert_eq!(
            registry.get("palm").unwrap(),
            Some(ActionDescriptor::System(SystemAction::Right))
        );
    }

    #[test]
    fn test_unknown_text_is_shell_command() {
        let descriptor = ActionDescriptor::parse("notify-send hola");
        assert_eq!(descriptor, ActionDescriptor::Shell("notify-send hola".to_string()));
        // las acciones distinguen mayúsculas como en el archivo
        assert!(matches!(ActionDescriptor::parse("VolumeUp"), ActionDescriptor::Shell(_)));
    }

    #[test]
    fn test_file_stores_plain_strings() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.set("ok_sign", ActionDescriptor::parse("ok")).unwrap();
        registry
            .set("peace", ActionDescriptor::parse("xdg-open https://example.org"))
            .unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(registry.path()).unwrap()).unwrap();
        assert_eq!(raw["ok_sign"], "ok");
        assert_eq!(raw["peace"], "xdg-open https://example.org");
    }

    #[test]
    fn test_reads_external_edits() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        fs::write(registry.path(), r#"{"thumbs_up": "space"}"#).unwrap();
        assert_eq!(
            registry.get("thumbs_up").unwrap(),
            Some(ActionDescriptor::System(SystemAction::Space))
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        fs::write(registry.path(), "[1, 2").unwrap();
        assert!(matches!(registry.get("fist"), Err(RegistryError::Parse { .. })));
    }
}
