//! Estimación de flexión de dedos a partir de tripletes de articulaciones.
//!
//! Sólo se usan x e y: la profundidad de un estimador monocular es demasiado
//! ruidosa para medir ángulos de articulación.

use crate::types::{Finger, FingerBends, LandmarkSet, Point3};

/// Ángulo (grados) considerado dedo totalmente doblado
pub const DEFAULT_BENT_DEG: f32 = 80.0;
/// Ángulo (grados) considerado dedo recto
pub const DEFAULT_STRAIGHT_DEG: f32 = 170.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BendRange {
    pub bent_deg: f32,
    pub straight_deg: f32,
}

impl Default for BendRange {
    fn default() -> Self {
        Self {
            bent_deg: DEFAULT_BENT_DEG,
            straight_deg: DEFAULT_STRAIGHT_DEG,
        }
    }
}

/// Ángulo en el vértice `b` entre los rayos b→a y b→c, en grados [0, 180].
/// Un rayo de longitud cero no define ángulo y se trata como dedo recto (180°).
pub fn joint_angle_deg(a: Point3, b: Point3, c: Point3) -> f32 {
    let (bax, bay) = (a.x - b.x, a.y - b.y);
    let (bcx, bcy) = (c.x - b.x, c.y - b.y);
    let len_ba = (bax * bax + bay * bay).sqrt();
    let len_bc = (bcx * bcx + bcy * bcy).sqrt();
    if len_ba <= f32::EPSILON || len_bc <= f32::EPSILON {
        return 180.0;
    }

    let cos = ((bax * bcx + bay * bcy) / (len_ba * len_bc)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Interpolación lineal sin acotar, como `map()` de p5
fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

/// Extensión de un dedo en [0, 100] con el rango por defecto (80°..170°)
pub fn bend_angle(a: Point3, b: Point3, c: Point3) -> f32 {
    bend_angle_with(a, b, c, BendRange::default())
}

pub fn bend_angle_with(a: Point3, b: Point3, c: Point3, range: BendRange) -> f32 {
    let deg = joint_angle_deg(a, b, c);
    // Primero se acota el ángulo al dominio, después el resultado al rango.
    let lo = range.bent_deg.min(range.straight_deg);
    let hi = range.bent_deg.max(range.straight_deg);
    if hi - lo <= f32::EPSILON {
        return if deg >= hi { 100.0 } else { 0.0 };
    }
    let deg = deg.max(lo).min(hi);
    let value = map_range(deg, range.bent_deg, range.straight_deg, 0.0, 100.0);
    value.clamp(0.0, 100.0)
}

/// Calcula la extensión de los cinco dedos de una mano
#[derive(Debug, Clone, Default)]
pub struct BendEstimator {
    range: BendRange,
}

impl BendEstimator {
    pub fn new(range: BendRange) -> Self {
        Self { range }
    }

    pub fn estimate(&self, landmarks: &LandmarkSet) -> FingerBends {
        let mut bends = FingerBends::default();
        for finger in Finger::ALL {
            let (a, b, c) = finger.joints();
            bends.values[finger as usize] = bend_angle_with(
                landmarks.get(a),
                landmarks.get(b),
                landmarks.get(c),
                self.range,
            );
        }
        bends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point3 {
        Point3::new(x, y, 0.0)
    }

    /// Triplete con ángulo `deg` en el vértice
    fn triplet(deg: f32) -> (Point3, Point3, Point3) {
        let rad = deg.to_radians();
        (p(10.0, 0.0), p(0.0, 0.0), p(10.0 * rad.cos(), 10.0 * rad.sin()))
    }

    #[test]
    fn test_straight_and_bent_extremes() {
        let (a, b, c) = triplet(180.0);
        assert!((bend_angle(a, b, c) - 100.0).abs() < 1e-3);

        let (a, b, c) = triplet(170.0);
        assert!((bend_angle(a, b, c) - 100.0).abs() < 1e-3);

        let (a, b, c) = triplet(80.0);
        assert!(bend_angle(a, b, c).abs() < 1e-3);

        let (a, b, c) = triplet(30.0);
        assert_eq!(bend_angle(a, b, c), 0.0);
    }

    #[test]
    fn test_linear_inside_domain() {
        let (a, b, c) = triplet(125.0);
        assert!((bend_angle(a, b, c) - 50.0).abs() < 1e-2);
    }

    #[test]
    fn test_scale_and_reflection_invariance() {
        for deg in [45.0, 95.0, 140.0, 175.0] {
            let (a, b, c) = triplet(deg);
            let base = bend_angle(a, b, c);

            let s = 3.7;
            let scaled = bend_angle(
                p(a.x * s, a.y * s),
                p(b.x * s, b.y * s),
                p(c.x * s, c.y * s),
            );
            assert!((base - scaled).abs() < 1e-3);

            // reflejo respecto al vértice (b está en el origen)
            let reflected = bend_angle(p(-a.x, -a.y), b, p(-c.x, -c.y));
            assert!((base - reflected).abs() < 1e-3);

            let swapped = bend_angle(c, b, a);
            assert!((base - swapped).abs() < 1e-3);
        }
    }

    #[test]
    fn test_degenerate_inputs_stay_in_range() {
        let o = p(5.0, 5.0);
        let cases = [
            (o, o, o),
            (o, o, p(9.0, 9.0)),
            (p(0.0, 0.0), p(1.0, 1.0), p(2.0, 2.0)),
            (p(2.0, 2.0), p(1.0, 1.0), p(2.0, 2.0)),
        ];
        for (a, b, c) in cases {
            let v = bend_angle(a, b, c);
            assert!(v.is_finite());
            assert!((0.0..=100.0).contains(&v), "{}", v);
        }
    }

    #[test]
    fn test_depth_is_ignored() {
        let (a, b, c) = triplet(120.0);
        let deep = Point3::new(c.x, c.y, 500.0);
        assert_eq!(bend_angle(a, b, c), bend_angle(a, b, deep));
    }

    #[test]
    fn test_inverted_range_stays_clamped() {
        // rango mal configurado: la interpolación sale del rango y el segundo clamp la acota
        let range = BendRange {
            bent_deg: 170.0,
            straight_deg: 80.0,
        };
        for deg in [0.0, 60.0, 100.0, 150.0, 180.0] {
            let (a, b, c) = triplet(deg);
            let v = bend_angle_with(a, b, c, range);
            assert!((0.0..=100.0).contains(&v), "deg={} v={}", deg, v);
        }
    }
}
