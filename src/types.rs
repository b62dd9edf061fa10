use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Constantes del sistema
pub const NUM_LANDMARKS: usize = 21;
pub const NUM_FINGERS: usize = 5;

/// Índices de landmarks de la mano
pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

pub const FINGERTIPS: [usize; NUM_FINGERS] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
pub const PROXIMAL_JOINTS: [usize; NUM_FINGERS] = [THUMB_MCP, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("Se esperaban {expected} landmarks, llegaron {actual}")]
    WrongCount { expected: usize, actual: usize },

    #[error("Landmark {index} no es finito")]
    NonFinite { index: usize },
}

/// Un punto en espacio de píxeles de la cámara (z = profundidad estimada)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn norm_xy(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn norm(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl From<[f32; 3]> for Point3 {
    fn from(p: [f32; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Los 21 landmarks de una mano en un frame. Inmutable una vez construido.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point3; NUM_LANDMARKS],
}

impl LandmarkSet {
    pub fn new(points: [Point3; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Construye desde la salida cruda del estimador de pose: [[x, y, z]; 21]
    pub fn from_raw(raw: &[[f32; 3]]) -> Result<Self, LandmarkError> {
        if raw.len() != NUM_LANDMARKS {
            return Err(LandmarkError::WrongCount {
                expected: NUM_LANDMARKS,
                actual: raw.len(),
            });
        }
        if let Some(index) = raw.iter().position(|p| p.iter().any(|v| !v.is_finite())) {
            return Err(LandmarkError::NonFinite { index });
        }

        let mut points = [Point3::default(); NUM_LANDMARKS];
        for (dst, src) in points.iter_mut().zip(raw) {
            *dst = Point3::from(*src);
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point3; NUM_LANDMARKS] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Point3 {
        self.points[index]
    }

    pub fn wrist(&self) -> Point3 {
        self.points[WRIST]
    }

    /// Espejo horizontal (x -> -x), equivalente a la vista de cámara volteada
    pub fn mirrored(&self) -> Self {
        let mut points = self.points;
        for p in points.iter_mut() {
            p.x = -p.x;
        }
        Self { points }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; NUM_FINGERS] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Letra usada en el protocolo de línea: T, I, M, R, P
    pub fn letter(&self) -> char {
        match self {
            Finger::Thumb => 'T',
            Finger::Index => 'I',
            Finger::Middle => 'M',
            Finger::Ring => 'R',
            Finger::Pinky => 'P',
        }
    }

    /// Triplete (base, articulación media, punta) usado para medir flexión
    pub fn joints(&self) -> (usize, usize, usize) {
        match self {
            Finger::Thumb => (THUMB_MCP, THUMB_IP, THUMB_TIP),
            Finger::Index => (INDEX_MCP, INDEX_PIP, INDEX_TIP),
            Finger::Middle => (MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP),
            Finger::Ring => (RING_MCP, RING_PIP, RING_TIP),
            Finger::Pinky => (PINKY_MCP, PINKY_PIP, PINKY_TIP),
        }
    }
}

/// Extensión de cada dedo en [0, 100]: 100 = recto, 0 = doblado
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FingerBends {
    pub values: [f32; NUM_FINGERS],
}

impl FingerBends {
    pub fn uniform(value: f32) -> Self {
        Self {
            values: [value; NUM_FINGERS],
        }
    }

    pub fn get(&self, finger: Finger) -> f32 {
        self.values[finger as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Finger, f32)> + '_ {
        Finger::ALL.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rejects_wrong_count() {
        let raw = vec![[0.0; 3]; 20];
        assert_eq!(
            LandmarkSet::from_raw(&raw),
            Err(LandmarkError::WrongCount {
                expected: 21,
                actual: 20
            })
        );
    }

    #[test]
    fn test_from_raw_rejects_nan() {
        let mut raw = vec![[1.0; 3]; 21];
        raw[7][1] = f32::NAN;
        assert_eq!(
            LandmarkSet::from_raw(&raw),
            Err(LandmarkError::NonFinite { index: 7 })
        );
    }

    #[test]
    fn test_mirrored_flips_x_only() {
        let raw: Vec<[f32; 3]> = (0..21).map(|i| [i as f32, 2.0 * i as f32, 1.0]).collect();
        let set = LandmarkSet::from_raw(&raw).unwrap();
        let m = set.mirrored();
        assert_eq!(m.get(5), Point3::new(-5.0, 10.0, 1.0));
        assert_eq!(m.mirrored(), set);
    }

    #[test]
    fn test_finger_letters_and_order() {
        let letters: String = Finger::ALL.iter().map(|f| f.letter()).collect();
        assert_eq!(letters, "TIMRP");
        for (i, f) in Finger::ALL.iter().enumerate() {
            assert_eq!(*f as usize, i);
            assert_eq!(f.joints().0, PROXIMAL_JOINTS[i]);
            assert_eq!(f.joints().2, FINGERTIPS[i]);
        }
    }
}
