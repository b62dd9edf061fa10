//! Protocolo de línea hacia el periférico: texto ASCII terminado en '\n'.
//!
//! Ejemplos: `G3\n`, `IDfist\n`, `T80I10M90R5P0\n`, `1\n`, `stop\n`.

use serde::{Deserialize, Serialize};

use crate::types::FingerBends;

pub const STOP_MESSAGE: &str = "stop";

/// Porcentaje a partir del cual un dedo cuenta como extendido
pub const DEFAULT_DIGITAL_THRESHOLD: f32 = 50.0;

/// Codificación de la extensión de dedos (modo FingerSync)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FingerEncoding {
    /// `T{0-100}I{0-100}M{0-100}R{0-100}P{0-100}`
    #[default]
    Analog,
    /// `T{0|1}I{0|1}M{0|1}R{0|1}P{0|1}`
    Digital,
    /// número de dedos extendidos
    Count,
}

/// Codificación de la etiqueta reconocida (modo GestureKnn)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GestureEncoding {
    /// `ID{label}`
    #[default]
    Id,
    /// `G{label}`
    G,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    Analog,
    Digital,
    Count,
    Id,
    G,
}

impl ProtocolVariant {
    pub fn finger(self) -> Option<FingerEncoding> {
        match self {
            ProtocolVariant::Analog => Some(FingerEncoding::Analog),
            ProtocolVariant::Digital => Some(FingerEncoding::Digital),
            ProtocolVariant::Count => Some(FingerEncoding::Count),
            ProtocolVariant::Id | ProtocolVariant::G => None,
        }
    }

    pub fn gesture(self) -> Option<GestureEncoding> {
        match self {
            ProtocolVariant::Id => Some(GestureEncoding::Id),
            ProtocolVariant::G => Some(GestureEncoding::G),
            _ => None,
        }
    }
}

/// Un mensaje lógico hacia el periférico
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Gesture { label: String, encoding: GestureEncoding },
    Fingers { bends: FingerBends, encoding: FingerEncoding, threshold: f32 },
    Stop,
}

impl OutboundMessage {
    /// Cuerpo del mensaje sin terminador
    pub fn body(&self) -> String {
        match self {
            OutboundMessage::Gesture { label, encoding } => match encoding {
                GestureEncoding::Id => format!("ID{}", label),
                GestureEncoding::G => format!("G{}", label),
            },
            OutboundMessage::Fingers {
                bends,
                encoding,
                threshold,
            } => encode_fingers(bends, *encoding, *threshold),
            OutboundMessage::Stop => STOP_MESSAGE.to_string(),
        }
    }

    /// Trama lista para el enlace: ASCII + '\n'
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = self.body().into_bytes();
        frame.push(b'\n');
        frame
    }
}

fn encode_fingers(bends: &FingerBends, encoding: FingerEncoding, threshold: f32) -> String {
    match encoding {
        FingerEncoding::Analog => bends
            .iter()
            .map(|(finger, v)| format!("{}{}", finger.letter(), v.clamp(0.0, 100.0).round() as u8))
            .collect(),
        FingerEncoding::Digital => bends
            .iter()
            .map(|(finger, v)| format!("{}{}", finger.letter(), u8::from(v > threshold)))
            .collect(),
        FingerEncoding::Count => bends
            .iter()
            .filter(|(_, v)| *v > threshold)
            .count()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingers(values: [f32; 5], encoding: FingerEncoding) -> OutboundMessage {
        OutboundMessage::Fingers {
            bends: FingerBends { values },
            encoding,
            threshold: DEFAULT_DIGITAL_THRESHOLD,
        }
    }

    #[test]
    fn test_gesture_frames() {
        let id = OutboundMessage::Gesture {
            label: "fist".into(),
            encoding: GestureEncoding::Id,
        };
        assert_eq!(id.to_frame(), b"IDfist\n".to_vec());

        let g = OutboundMessage::Gesture {
            label: "3".into(),
            encoding: GestureEncoding::G,
        };
        assert_eq!(g.to_frame(), b"G3\n".to_vec());
    }

    #[test]
    fn test_analog_frame_rounds_and_clamps() {
        let msg = fingers([80.4, 10.0, 89.6, 5.0, -3.0], FingerEncoding::Analog);
        assert_eq!(msg.body(), "T80I10M90R5P0");
    }

    #[test]
    fn test_digital_frame() {
        let msg = fingers([92.0; 5], FingerEncoding::Digital);
        assert_eq!(msg.to_frame(), b"T1I1M1R1P1\n".to_vec());

        let msg = fingers([50.0, 51.0, 0.0, 100.0, 49.9], FingerEncoding::Digital);
        assert_eq!(msg.body(), "T0I1M0R1P0");
    }

    #[test]
    fn test_count_frame() {
        let msg = fingers([80.0, 10.0, 90.0, 5.0, 0.0], FingerEncoding::Count);
        assert_eq!(msg.to_frame(), b"2\n".to_vec());
    }

    #[test]
    fn test_stop_frame() {
        assert_eq!(OutboundMessage::Stop.to_frame(), b"stop\n".to_vec());
    }

    #[test]
    fn test_variant_routing() {
        assert_eq!(ProtocolVariant::Digital.finger(), Some(FingerEncoding::Digital));
        assert_eq!(ProtocolVariant::Digital.gesture(), None);
        assert_eq!(ProtocolVariant::G.gesture(), Some(GestureEncoding::G));
        assert_eq!(ProtocolVariant::Id.finger(), None);
    }
}
