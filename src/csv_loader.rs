use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;

use crate::types::{LandmarkSet, Point3, NUM_LANDMARKS};

/// Un frame grabado: índice original y landmarks (None si no hubo mano)
pub type RecordedFrame = (usize, Option<LandmarkSet>);

/// Carga una grabación desde un CSV en el formato frame,landmark,x,y,z.
/// Los índices de frame sin filas se devuelven como frames sin mano.
pub fn load_recording(path: impl AsRef<Path>) -> Result<Vec<RecordedFrame>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut frames: BTreeMap<usize, [Option<Point3>; NUM_LANDMARKS]> = BTreeMap::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        if record.len() < 5 {
            bail!("La fila {} no tiene 5 columnas", row_idx + 1);
        }

        let frame: usize = record[0]
            .trim()
            .parse()
            .with_context(|| format!("frame inválido en fila {}", row_idx + 1))?;
        let landmark: usize = record[1]
            .trim()
            .parse()
            .with_context(|| format!("landmark inválido en fila {}", row_idx + 1))?;

        if landmark >= NUM_LANDMARKS {
            bail!("Landmark {} fuera de rango (fila {})", landmark, row_idx + 1);
        }

        let mut coords = [0.0f32; 3];
        for (axis, value) in coords.iter_mut().enumerate() {
            *value = record[2 + axis]
                .trim()
                .parse()
                .with_context(|| format!("coordenada inválida en fila {}", row_idx + 1))?;
        }

        let points = frames.entry(frame).or_insert([None; NUM_LANDMARKS]);
        points[landmark] = Some(Point3::from(coords));
    }

    let max_frame = *frames
        .keys()
        .next_back()
        .ok_or_else(|| anyhow!("El CSV {:?} no contiene datos", path))?;

    let mut recording = Vec::with_capacity(max_frame + 1);
    for frame_idx in 0..=max_frame {
        let Some(points) = frames.get(&frame_idx) else {
            recording.push((frame_idx, None));
            continue;
        };

        let mut complete = [Point3::default(); NUM_LANDMARKS];
        for (i, p) in points.iter().enumerate() {
            complete[i] = p.ok_or_else(|| {
                anyhow!("Frame {} sin landmark {} en {:?}", frame_idx, i, path)
            })?;
        }
        recording.push((frame_idx, Some(LandmarkSet::new(complete))));
    }

    Ok(recording)
}

/// Sólo los frames con mano
pub fn load_hands(path: impl AsRef<Path>) -> Result<Vec<LandmarkSet>> {
    Ok(load_recording(path)?
        .into_iter()
        .filter_map(|(_, hand)| hand)
        .collect())
}
