use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::persist;
use crate::types::{FeatureVector, FEATURE_LEN, UNKNOWN_GESTURE};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("No se pudo leer el dataset {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Dataset {path:?} inválido: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No se pudo escribir {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid feature size: expected {expected}, got {actual}")]
    FeatureLength { expected: usize, actual: usize },

    #[error("No hay muestras que guardar para '{label}'")]
    EmptyBatch { label: String },
}

/// Una muestra etiquetada tal como se guarda en el dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub label: usize,
    pub landmarks: FeatureVector,
}

/// Nombre de gesto → id de etiqueta.
///
/// Un nombre nuevo recibe `max id + 1` (0 si está vacío). Borrar no renumera,
/// así que puede haber huecos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSpace {
    classes: BTreeMap<String, usize>,
}

impl LabelSpace {
    pub fn label_id(&self, name: &str) -> Option<usize> {
        self.classes.get(name).copied()
    }

    /// Nombre del gesto con ese id, o "unknown" si no existe
    pub fn resolve_name(&self, label_id: usize) -> &str {
        self.classes
            .iter()
            .find(|(_, &id)| id == label_id)
            .map(|(name, _)| name.as_str())
            .unwrap_or(UNKNOWN_GESTURE)
    }

    /// Ancho de salida que necesita el clasificador: max id + 1
    pub fn width(&self) -> usize {
        self.classes.values().max().map(|m| m + 1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.classes.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// Devuelve (id, es_nuevo)
    fn register(&mut self, name: &str) -> (usize, bool) {
        if let Some(id) = self.label_id(name) {
            return (id, false);
        }
        let id = self.width();
        self.classes.insert(name.to_string(), id);
        (id, true)
    }

    fn remove(&mut self, name: &str) -> Option<usize> {
        self.classes.remove(name)
    }
}

#[derive(Deserialize)]
struct DatasetFile {
    #[serde(default)]
    classes: LabelSpace,
    #[serde(default)]
    data: Vec<Sample>,
}

#[derive(Serialize)]
struct DatasetView<'a> {
    classes: &'a LabelSpace,
    data: &'a [Sample],
}

/// Colección de muestras etiquetadas persistida en JSON
#[derive(Debug)]
pub struct DatasetStore {
    path: PathBuf,
    labels: LabelSpace,
    data: Vec<Sample>,
}

impl DatasetStore {
    /// Abre el dataset; si el archivo no existe empieza vacío.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "dataset inexistente, se empieza vacío");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(DatasetError::Read { path, source }),
        };

        let file: DatasetFile = serde_json::from_str(&content).map_err(|source| {
            DatasetError::Parse {
                path: path.clone(),
                source,
            }
        })?;

        info!(
            path = %path.display(),
            gestures = file.classes.len(),
            samples = file.data.len(),
            "📂 Dataset cargado"
        );
        Ok(Self {
            path,
            labels: file.classes,
            data: file.data,
        })
    }

    /// Dataset vacío asociado a `path`; no toca el disco hasta el primer cambio.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            labels: LabelSpace::default(),
            data: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn labels(&self) -> &LabelSpace {
        &self.labels
    }

    pub fn samples(&self) -> &[Sample] {
        &self.data
    }

    pub fn resolve_name(&self, label_id: usize) -> &str {
        self.labels.resolve_name(label_id)
    }

    pub fn sample_count(&self, label_name: &str) -> usize {
        match self.labels.label_id(label_name) {
            Some(id) => self.data.iter().filter(|s| s.label == id).count(),
            None => 0,
        }
    }

    pub fn append(&mut self, label_name: &str, features: FeatureVector) -> Result<usize, DatasetError> {
        self.append_batch(label_name, vec![features])
    }

    /// Añade muestras para `label_name` y persiste antes de devolver el id.
    ///
    /// Si la escritura falla el estado en memoria queda como estaba.
    pub fn append_batch(
        &mut self,
        label_name: &str,
        batch: Vec<FeatureVector>,
    ) -> Result<usize, DatasetError> {
        // un lote vacío no debe registrar una etiqueta sin muestras
        if batch.is_empty() {
            return Err(DatasetError::EmptyBatch {
                label: label_name.to_string(),
            });
        }
        if let Some(bad) = batch.iter().find(|f| f.len() != FEATURE_LEN) {
            return Err(DatasetError::FeatureLength {
                expected: FEATURE_LEN,
                actual: bad.len(),
            });
        }

        let (label, is_new) = self.labels.register(label_name);
        let previous_len = self.data.len();
        let added = batch.len();
        self.data
            .extend(batch.into_iter().map(|landmarks| Sample { label, landmarks }));

        if let Err(e) = self.persist() {
            self.data.truncate(previous_len);
            if is_new {
                self.labels.remove(label_name);
            }
            return Err(e);
        }

        info!(gesture = label_name, label, added, "💾 Muestras guardadas");
        Ok(label)
    }

    /// Borra un gesto y sus muestras; los demás ids no cambian.
    pub fn delete(&mut self, label_name: &str) -> Result<bool, DatasetError> {
        let Some(label) = self.labels.remove(label_name) else {
            return Ok(false);
        };
        let removed: Vec<Sample> = self.data.iter().filter(|s| s.label == label).cloned().collect();
        self.data.retain(|s| s.label != label);

        if let Err(e) = self.persist() {
            self.labels.classes.insert(label_name.to_string(), label);
            self.data.extend(removed);
            return Err(e);
        }

        info!(gesture = label_name, label, "🗑️  Gesto borrado del dataset");
        Ok(true)
    }

    /// Borra dataset, modelo entrenado y estado en memoria; sin efecto si no hay nada.
    pub fn clear_all(&mut self, model_path: &Path) -> Result<(), DatasetError> {
        for path in [self.path.as_path(), model_path] {
            persist::remove_if_exists(path).map_err(|source| DatasetError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        self.labels = LabelSpace::default();
        self.data.clear();
        info!("🗑️  Todos los datos de entrenamiento y el modelo han sido borrados");
        Ok(())
    }

    fn persist(&self) -> Result<(), DatasetError> {
        let view = DatasetView {
            classes: &self.labels,
            data: &self.data,
        };
        persist::write_json_atomic(&self.path, &view).map_err(|source| DatasetError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
