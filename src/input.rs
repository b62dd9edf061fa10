//! Entradas del daemon: una línea JSON por mensaje en stdin.
//!
//! `{"type":"frame","landmarks":[[x,y,z], ...]}` o `{"type":"frame","landmarks":null}`
//! para frames, y `{"type":"connect"}`, `{"type":"add_example","label":"fist"}`, etc.
//! para la superficie de control.

use std::time::Instant;

use serde::Deserialize;
use tracing::{info, warn};

use crate::controller::{FrameOutcome, Mode, RecognitionController};
use crate::protocol::ProtocolVariant;
use crate::types::{LandmarkError, LandmarkSet};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Input {
    Frame {
        landmarks: Option<Vec<[f32; 3]>>,
    },
    Connect,
    Disconnect,
    HoldTrain {
        active: bool,
        #[serde(default)]
        label: Option<String>,
    },
    AddExample {
        label: String,
    },
    RemoveLabel {
        label: String,
    },
    ResetAll,
    SetMode {
        mode: Mode,
    },
    SetProtocol {
        variant: ProtocolVariant,
    },
    StartTransmission,
    StopTransmission,
    SetFlip {
        flipped: bool,
    },
}

impl Input {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Aplica una entrada al controlador. Devuelve el resultado si era un frame.
pub fn apply(
    controller: &mut RecognitionController,
    input: Input,
    now: Instant,
) -> Result<Option<FrameOutcome>, LandmarkError> {
    match input {
        Input::Frame { landmarks } => {
            let hand = landmarks
                .as_deref()
                .map(LandmarkSet::from_raw)
                .transpose()?;
            return Ok(Some(controller.on_frame(hand.as_ref(), now)));
        }
        Input::Connect => {
            if !controller.connect() {
                warn!("⚠️  Ya hay una conexión en curso");
            }
        }
        Input::Disconnect => controller.disconnect(),
        Input::HoldTrain { active, label } => controller.set_hold_train(active, label.as_deref()),
        Input::AddExample { label } => controller.add_example(&label),
        Input::RemoveLabel { label } => {
            if !controller.remove_label(&label) {
                warn!("⚠️  Etiqueta '{}' no existe", label);
            }
        }
        Input::ResetAll => controller.reset_all(),
        Input::SetMode { mode } => controller.set_mode(mode),
        Input::SetProtocol { variant } => controller.set_protocol_variant(variant),
        Input::StartTransmission => controller.start_transmission(),
        Input::StopTransmission => {
            let outcome = controller.stop_transmission();
            info!("stop -> {:?}", outcome);
        }
        Input::SetFlip { flipped } => controller.set_flip(flipped),
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::MemoryLink;
    use crate::config::Config;
    use crate::types::NUM_LANDMARKS;

    #[test]
    fn test_parse_control_inputs() {
        assert_eq!(Input::parse(r#"{"type":"connect"}"#).unwrap(), Input::Connect);
        assert_eq!(
            Input::parse(r#"{"type":"hold_train","active":true}"#).unwrap(),
            Input::HoldTrain {
                active: true,
                label: None
            }
        );
        assert_eq!(
            Input::parse(r#"{"type":"set_mode","mode":"finger_sync"}"#).unwrap(),
            Input::SetMode {
                mode: Mode::FingerSync
            }
        );
        assert_eq!(
            Input::parse(r#"{"type":"set_protocol","variant":"digital"}"#).unwrap(),
            Input::SetProtocol {
                variant: ProtocolVariant::Digital
            }
        );
        assert!(Input::parse(r#"{"type":"launch"}"#).is_err());
        assert!(Input::parse("no es json").is_err());
    }

    #[test]
    fn test_parse_frames() {
        let empty = Input::parse(r#"{"type":"frame","landmarks":null}"#).unwrap();
        assert_eq!(empty, Input::Frame { landmarks: None });

        let points = vec![[1.0f32, 2.0, 3.0]; NUM_LANDMARKS];
        let line = serde_json::json!({ "type": "frame", "landmarks": points }).to_string();
        match Input::parse(&line).unwrap() {
            Input::Frame {
                landmarks: Some(raw),
            } => assert_eq!(raw.len(), NUM_LANDMARKS),
            other => panic!("entrada inesperada: {:?}", other),
        }
    }

    #[test]
    fn test_apply_frames_and_commands() {
        let link = MemoryLink::new();
        let mut controller = RecognitionController::new(&Config::default(), Box::new(link));
        let now = Instant::now();

        let outcome = apply(&mut controller, Input::Frame { landmarks: None }, now).unwrap();
        assert_eq!(outcome, Some(FrameOutcome::NoHand));

        let short = Input::Frame {
            landmarks: Some(vec![[0.0; 3]; 5]),
        };
        assert!(apply(&mut controller, short, now).is_err());

        apply(
            &mut controller,
            Input::AddExample {
                label: "fist".into(),
            },
            now,
        )
        .unwrap();
        let raw: Vec<[f32; 3]> = (0..NUM_LANDMARKS)
            .map(|i| [i as f32 * 3.0, 100.0 - i as f32, 0.0])
            .collect();
        let outcome = apply(&mut controller, Input::Frame { landmarks: Some(raw) }, now).unwrap();
        assert!(matches!(outcome, Some(FrameOutcome::Trained(_))));

        apply(&mut controller, Input::StartTransmission, now).unwrap();
        assert!(controller.is_tracking());
        apply(
            &mut controller,
            Input::SetMode {
                mode: Mode::FingerSync,
            },
            now,
        )
        .unwrap();
        assert!(!controller.is_tracking());
    }
}
