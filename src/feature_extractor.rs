use crate::types::{LandmarkSet, Point3, MIDDLE_MCP, NUM_LANDMARKS, WRIST};
use serde::{Deserialize, Serialize};

/// Referencia mínima de tamaño de mano (en píxeles). Evita dividir por ~0
/// cuando la mano ocupa casi nada o la muñeca coincide con la base del medio.
pub const MIN_SCALE: f32 = 1.0;

/// Presets de normalización.
///
/// - `Translation`: sólo resta la muñeca. NO es invariante a escala ni rotación.
/// - `Scaled`: traslación + división por la distancia máxima muñeca→landmark
///   (invariante a traslación y escala, no a rotación). 40 valores.
/// - `Full`: traslación + escala por muñeca→base del medio + rotación que
///   alinea ese vector hacia arriba. Usa profundidad. 60 valores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    Translation,
    #[default]
    Scaled,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleReference {
    None,
    MaxWristDistance,
    WristToMiddleBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub scale: ScaleReference,
    pub rotate: bool,
    pub use_depth: bool,
    pub include_wrist: bool,
}

impl NormalizerConfig {
    pub fn for_mode(mode: NormalizationMode) -> Self {
        match mode {
            NormalizationMode::Translation => Self {
                scale: ScaleReference::None,
                rotate: false,
                use_depth: false,
                include_wrist: false,
            },
            NormalizationMode::Scaled => Self {
                scale: ScaleReference::MaxWristDistance,
                rotate: false,
                use_depth: false,
                include_wrist: false,
            },
            NormalizationMode::Full => Self {
                scale: ScaleReference::WristToMiddleBase,
                rotate: true,
                use_depth: true,
                include_wrist: false,
            },
        }
    }

    pub fn with_include_wrist(mut self, include_wrist: bool) -> Self {
        self.include_wrist = include_wrist;
        self
    }

    pub fn axes(&self) -> usize {
        if self.use_depth {
            3
        } else {
            2
        }
    }

    /// Longitud del vector de características (40, 42, 60 o 63)
    pub fn feature_len(&self) -> usize {
        let points = if self.include_wrist {
            NUM_LANDMARKS
        } else {
            NUM_LANDMARKS - 1
        };
        points * self.axes()
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self::for_mode(NormalizationMode::default())
    }
}

/// Convierte un LandmarkSet en un vector de características invariante a la
/// posición (y según el modo, al tamaño y la orientación) de la mano.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: NormalizerConfig,
}

impl FeatureExtractor {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn feature_len(&self) -> usize {
        self.config.feature_len()
    }

    /// Extrae el vector de características. El orden es estable:
    /// landmark i (saltando la muñeca si no se incluye), luego x, y[, z].
    pub fn extract(&self, landmarks: &LandmarkSet) -> Vec<f32> {
        let wrist = landmarks.wrist();
        let mut points: [Point3; NUM_LANDMARKS] = [Point3::default(); NUM_LANDMARKS];
        for (dst, src) in points.iter_mut().zip(landmarks.points()) {
            *dst = src.sub(wrist);
            if !self.config.use_depth {
                dst.z = 0.0;
            }
        }

        let scale = self.scale_reference(&points);
        let (sin, cos) = if self.config.rotate {
            self.alignment_angle(&points).sin_cos()
        } else {
            (0.0, 1.0)
        };

        let mut features = Vec::with_capacity(self.feature_len());
        let first = if self.config.include_wrist { WRIST } else { WRIST + 1 };
        for p in &points[first..] {
            let x = (p.x * cos - p.y * sin) / scale;
            let y = (p.x * sin + p.y * cos) / scale;
            features.push(x);
            features.push(y);
            if self.config.use_depth {
                features.push(p.z / scale);
            }
        }

        debug_assert_eq!(features.len(), self.feature_len());
        features
    }

    /// Tamaño de referencia de la mano, con piso en MIN_SCALE
    fn scale_reference(&self, translated: &[Point3; NUM_LANDMARKS]) -> f32 {
        let norm = |p: &Point3| {
            if self.config.use_depth {
                p.norm()
            } else {
                p.norm_xy()
            }
        };

        let reference = match self.config.scale {
            ScaleReference::None => return 1.0,
            ScaleReference::MaxWristDistance => translated[1..]
                .iter()
                .map(norm)
                .fold(0.0f32, f32::max),
            ScaleReference::WristToMiddleBase => norm(&translated[MIDDLE_MCP]),
        };

        reference.max(MIN_SCALE)
    }

    /// Ángulo que rota el vector muñeca→base del medio hasta apuntar hacia
    /// arriba en la imagen (y negativo en espacio de píxeles).
    fn alignment_angle(&self, translated: &[Point3; NUM_LANDMARKS]) -> f32 {
        let v = translated[MIDDLE_MCP];
        if v.norm_xy() < f32::EPSILON {
            return 0.0;
        }
        -std::f32::consts::FRAC_PI_2 - v.y.atan2(v.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mano abierta aproximada, muñeca abajo y dedos hacia arriba
    fn sample_hand() -> LandmarkSet {
        let raw: [[f32; 3]; NUM_LANDMARKS] = [
            [200.0, 300.0, 0.0],
            [170.0, 280.0, -5.0],
            [150.0, 260.0, -8.0],
            [135.0, 240.0, -10.0],
            [125.0, 220.0, -12.0],
            [180.0, 220.0, -3.0],
            [178.0, 190.0, -6.0],
            [176.0, 170.0, -8.0],
            [175.0, 150.0, -9.0],
            [200.0, 215.0, -2.0],
            [201.0, 180.0, -5.0],
            [202.0, 158.0, -7.0],
            [203.0, 138.0, -8.0],
            [220.0, 222.0, -2.0],
            [224.0, 192.0, -4.0],
            [226.0, 172.0, -6.0],
            [228.0, 155.0, -7.0],
            [238.0, 232.0, -1.0],
            [244.0, 210.0, -3.0],
            [247.0, 195.0, -4.0],
            [250.0, 180.0, -5.0],
        ];
        LandmarkSet::from_raw(&raw).unwrap()
    }

    /// Escala uniforme s, rotación theta en el plano de imagen y traslación v
    fn transform(hand: &LandmarkSet, s: f32, theta: f32, v: [f32; 3]) -> LandmarkSet {
        let (sin, cos) = theta.sin_cos();
        let raw: Vec<[f32; 3]> = hand
            .points()
            .iter()
            .map(|p| {
                [
                    s * (p.x * cos - p.y * sin) + v[0],
                    s * (p.x * sin + p.y * cos) + v[1],
                    s * p.z + v[2],
                ]
            })
            .collect();
        LandmarkSet::from_raw(&raw).unwrap()
    }

    fn max_diff(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
    }

    #[test]
    fn test_feature_lengths() {
        let hand = sample_hand();
        for (mode, len) in [
            (NormalizationMode::Translation, 40),
            (NormalizationMode::Scaled, 40),
            (NormalizationMode::Full, 60),
        ] {
            let extractor = FeatureExtractor::new(NormalizerConfig::for_mode(mode));
            assert_eq!(extractor.extract(&hand).len(), len);

            let with_wrist =
                FeatureExtractor::new(NormalizerConfig::for_mode(mode).with_include_wrist(true));
            assert_eq!(with_wrist.extract(&hand).len(), with_wrist.feature_len());
        }
    }

    #[test]
    fn test_full_mode_is_similarity_invariant() {
        let extractor = FeatureExtractor::new(NormalizerConfig::for_mode(NormalizationMode::Full));
        let hand = sample_hand();
        let base = extractor.extract(&hand);

        for &(s, theta, v) in &[
            (1.0, 0.0, [50.0, -20.0, 3.0]),
            (0.5, 0.3, [0.0, 0.0, 0.0]),
            (2.5, -1.2, [-100.0, 40.0, 0.0]),
            (1.7, 3.0, [10.0, 10.0, -4.0]),
        ] {
            let moved = extractor.extract(&transform(&hand, s, theta, v));
            assert!(
                max_diff(&base, &moved) < 1e-3,
                "s={} theta={} diff={}",
                s,
                theta,
                max_diff(&base, &moved)
            );
        }
    }

    #[test]
    fn test_full_mode_points_middle_base_up() {
        let extractor = FeatureExtractor::new(NormalizerConfig::for_mode(NormalizationMode::Full));
        let tilted = transform(&sample_hand(), 1.0, 0.8, [0.0; 3]);
        let f = extractor.extract(&tilted);
        // landmark 9 ocupa el slot 8 (muñeca excluida), 3 ejes
        let (x, y) = (f[8 * 3], f[8 * 3 + 1]);
        assert!(x.abs() < 1e-4);
        assert!(y < 0.0);
    }

    #[test]
    fn test_translation_only_is_translation_invariant_but_not_scale_or_rotation() {
        let extractor =
            FeatureExtractor::new(NormalizerConfig::for_mode(NormalizationMode::Translation));
        let hand = sample_hand();
        let base = extractor.extract(&hand);

        let shifted = extractor.extract(&transform(&hand, 1.0, 0.0, [-75.0, 33.0, 2.0]));
        assert!(max_diff(&base, &shifted) < 1e-3);

        let scaled = extractor.extract(&transform(&hand, 2.0, 0.0, [0.0; 3]));
        assert!(max_diff(&base, &scaled) > 1.0);

        let rotated = extractor.extract(&transform(&hand, 1.0, 0.5, [0.0; 3]));
        assert!(max_diff(&base, &rotated) > 1.0);
    }

    #[test]
    fn test_scaled_mode_is_scale_invariant_but_not_rotation() {
        let extractor = FeatureExtractor::new(NormalizerConfig::for_mode(NormalizationMode::Scaled));
        let hand = sample_hand();
        let base = extractor.extract(&hand);

        let scaled = extractor.extract(&transform(&hand, 0.4, 0.0, [12.0, 7.0, 0.0]));
        assert!(max_diff(&base, &scaled) < 1e-3);

        let rotated = extractor.extract(&transform(&hand, 1.0, 0.7, [0.0; 3]));
        assert!(max_diff(&base, &rotated) > 0.1);

        // la mayor distancia a la muñeca queda en 1
        let max_norm = base
            .chunks(2)
            .map(|c| (c[0] * c[0] + c[1] * c[1]).sqrt())
            .fold(0.0, f32::max);
        assert!((max_norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_hand_uses_scale_floor() {
        let raw = vec![[42.0, 42.0, 1.0]; NUM_LANDMARKS];
        let hand = LandmarkSet::from_raw(&raw).unwrap();
        for mode in [
            NormalizationMode::Translation,
            NormalizationMode::Scaled,
            NormalizationMode::Full,
        ] {
            let f = FeatureExtractor::new(NormalizerConfig::for_mode(mode)).extract(&hand);
            assert!(f.iter().all(|v| v.is_finite() && *v == 0.0));
        }
    }

    #[test]
    fn test_tiny_hand_is_not_blown_up() {
        let hand = transform(&sample_hand(), 0.001, 0.0, [0.0; 3]);
        let f = FeatureExtractor::new(NormalizerConfig::for_mode(NormalizationMode::Scaled))
            .extract(&hand);
        assert!(f.iter().all(|v| v.abs() < 1.0));
    }
}
