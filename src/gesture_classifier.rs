use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, info};

/// Vecinos consultados por defecto
pub const DEFAULT_K: usize = 3;

/// Distancia por debajo de la cual un ejemplo se considera idéntico a la consulta
const EXACT_MATCH_EPS: f32 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("No hay etiquetas entrenadas")]
    NoLabels,

    #[error("Invalid feature size: expected {expected}, got {actual}")]
    InvalidFeatureSize { expected: usize, actual: usize },

    #[error("El vector de características contiene valores no finitos")]
    NonFinite,

    #[error("La etiqueta no puede estar vacía")]
    EmptyLabel,
}

/// Una etiqueta de gesto: identificador, nombre visible y número de ejemplos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: u32,
    pub name: String,
    pub count: usize,
}

/// Resultado de una consulta: etiqueta ganadora y confianza por etiqueta
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label_id: u32,
    pub label: String,
    pub confidence: f32,
    /// Confianza de cada etiqueta presente en el almacén (suma 1)
    pub confidences: Vec<(String, f32)>,
}

impl Classification {
    pub fn confidence_of(&self, label: &str) -> f32 {
        self.confidences
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, c)| *c)
            .unwrap_or(0.0)
    }
}

struct LabelEntry {
    id: u32,
    name: String,
    examples: Vec<Vec<f32>>,
}

#[derive(Default)]
struct Store {
    labels: Vec<LabelEntry>,
    feature_len: Option<usize>,
    next_id: u32,
}

/// Clasificador k-NN entrenado en línea, un ejemplo a la vez.
///
/// Las consultas toman un lock de lectura y pueden correr en paralelo; altas y
/// borrados toman el de escritura, así una consulta nunca ve un borrado a medias.
pub struct GestureClassifier {
    k: usize,
    store: RwLock<Store>,
}

impl GestureClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            store: RwLock::new(Store::default()),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Añade un ejemplo. Sin deduplicación ni límite superior.
    pub fn add_example(&self, features: Vec<f32>, label: &str) -> Result<LabelInfo, ClassifierError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ClassifierError::EmptyLabel);
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::NonFinite);
        }

        let mut store = self.write();
        match store.feature_len {
            Some(expected) if expected != features.len() => {
                return Err(ClassifierError::InvalidFeatureSize {
                    expected,
                    actual: features.len(),
                });
            }
            Some(_) => {}
            None => store.feature_len = Some(features.len()),
        }

        let idx = match store.labels.iter().position(|e| e.name == label) {
            Some(idx) => idx,
            None => {
                let id = store.next_id;
                store.next_id += 1;
                store.labels.push(LabelEntry {
                    id,
                    name: label.to_string(),
                    examples: Vec::new(),
                });
                info!("🏷️  Nueva etiqueta '{}' (id {})", label, id);
                store.labels.len() - 1
            }
        };

        let entry = &mut store.labels[idx];
        entry.examples.push(features);
        Ok(LabelInfo {
            id: entry.id,
            name: entry.name.clone(),
            count: entry.examples.len(),
        })
    }

    /// Busca los k ejemplos más cercanos (euclídea) y vota ponderando por 1/d
    pub fn classify(&self, features: &[f32]) -> Result<Classification, ClassifierError> {
        let store = self.read();
        if store.labels.is_empty() {
            return Err(ClassifierError::NoLabels);
        }
        if let Some(expected) = store.feature_len {
            if expected != features.len() {
                return Err(ClassifierError::InvalidFeatureSize {
                    expected,
                    actual: features.len(),
                });
            }
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::NonFinite);
        }

        // (distancia, índice de etiqueta)
        let mut neighbors: Vec<(f32, usize)> = store
            .labels
            .iter()
            .enumerate()
            .flat_map(|(label_idx, entry)| {
                entry
                    .examples
                    .iter()
                    .map(move |example| (euclidean(example, features), label_idx))
            })
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbors.truncate(self.k);

        let mut weights = vec![0.0f32; store.labels.len()];
        let exact = neighbors
            .first()
            .map(|(d, _)| *d <= EXACT_MATCH_EPS)
            .unwrap_or(false);
        for &(dist, label_idx) in &neighbors {
            let w = if exact {
                if dist <= EXACT_MATCH_EPS {
                    1.0
                } else {
                    0.0
                }
            } else {
                1.0 / dist
            };
            weights[label_idx] += w;
        }

        let total: f32 = weights.iter().sum();
        let mut winner = 0;
        for (i, &w) in weights.iter().enumerate() {
            if w > weights[winner] {
                winner = i;
            }
        }

        let confidences: Vec<(String, f32)> = store
            .labels
            .iter()
            .zip(&weights)
            .map(|(entry, &w)| (entry.name.clone(), w / total))
            .collect();
        let entry = &store.labels[winner];

        debug!("k-NN: {} ({:.2})", entry.name, confidences[winner].1);
        Ok(Classification {
            label_id: entry.id,
            label: entry.name.clone(),
            confidence: confidences[winner].1,
            confidences,
        })
    }

    /// Borra todos los ejemplos de una etiqueta. Devuelve si existía.
    pub fn clear_label(&self, label: &str) -> bool {
        let mut store = self.write();
        let before = store.labels.len();
        store.labels.retain(|e| e.name != label);
        let removed = store.labels.len() != before;
        if store.labels.is_empty() {
            store.feature_len = None;
        }
        if removed {
            info!("🗑️  Etiqueta '{}' eliminada", label);
        }
        removed
    }

    /// Vacía el almacén por completo (idempotente)
    pub fn clear_all(&self) {
        let mut store = self.write();
        *store = Store::default();
        info!("🧹 Todos los ejemplos eliminados");
    }

    /// Etiquetas en orden de creación con su número de ejemplos
    pub fn labels(&self) -> Vec<LabelInfo> {
        self.read()
            .labels
            .iter()
            .map(|e| LabelInfo {
                id: e.id,
                name: e.name.clone(),
                count: e.examples.len(),
            })
            .collect()
    }

    pub fn count_by_label(&self) -> HashMap<String, usize> {
        self.read()
            .labels
            .iter()
            .map(|e| (e.name.clone(), e.examples.len()))
            .collect()
    }

    pub fn num_labels(&self) -> usize {
        self.read().labels.len()
    }

    pub fn num_examples(&self) -> usize {
        self.read().labels.iter().map(|e| e.examples.len()).sum()
    }

    /// Longitud de vector fijada por el primer ejemplo (None si está vacío)
    pub fn feature_len(&self) -> Option<usize> {
        self.read().feature_len
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
