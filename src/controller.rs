//! Controlador de reconocimiento: un paso por frame.
//!
//! Por cada frame con mano: normaliza, entrena o clasifica (o mide flexión en
//! FingerSync), aplica el umbral de confianza y entrega el mensaje a la pasarela.
//! El contexto completo (modo, transmisión, enlace) vive en este objeto.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ble::Link;
use crate::config::Config;
use crate::feature_extractor::FeatureExtractor;
use crate::finger_bend::BendEstimator;
use crate::gateway::{Gateway, GatewayStats, LinkState, SendOutcome};
use crate::gesture_classifier::{Classification, ClassifierError, GestureClassifier, LabelInfo};
use crate::protocol::{FingerEncoding, GestureEncoding, OutboundMessage, ProtocolVariant};
use crate::types::{FingerBends, LandmarkSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    GestureKnn,
    FingerSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Idle,
    Training,
    Classifying,
}

/// Lo que hizo el controlador con un frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No hubo mano en este frame; se salta sin error
    NoHand,
    /// Mano presente pero nada que hacer (sin etiquetas o sin texto de etiqueta)
    Idle,
    Trained(LabelInfo),
    Classified {
        result: Classification,
        accepted: bool,
        sent: Option<SendOutcome>,
    },
    /// La consulta falló; se reintenta sola en el próximo frame
    Rejected(ClassifierError),
    Fingers {
        bends: FingerBends,
        sent: Option<SendOutcome>,
    },
}

pub struct RecognitionController {
    mode: Mode,
    state: RecognitionState,
    tracking: bool,
    hold_train: bool,
    label_text: String,
    pending_examples: VecDeque<String>,
    flip: bool,
    confidence_threshold: f32,
    finger_encoding: FingerEncoding,
    gesture_encoding: GestureEncoding,
    digital_threshold: f32,
    extractor: FeatureExtractor,
    bend_estimator: BendEstimator,
    classifier: Arc<GestureClassifier>,
    gateway: Gateway,
    bends: FingerBends,
    status: String,
}

impl RecognitionController {
    pub fn new(config: &Config, link: Box<dyn Link>) -> Self {
        Self {
            mode: config.mode,
            state: RecognitionState::Idle,
            tracking: false,
            hold_train: false,
            label_text: String::new(),
            pending_examples: VecDeque::new(),
            flip: config.flip,
            confidence_threshold: config.confidence_threshold,
            finger_encoding: config.finger_encoding,
            gesture_encoding: config.gesture_encoding,
            digital_threshold: config.digital_threshold,
            extractor: FeatureExtractor::new(config.normalizer()),
            bend_estimator: BendEstimator::new(config.bend_range()),
            classifier: Arc::new(GestureClassifier::new(config.k)),
            gateway: Gateway::new(link, config.send_interval()),
            bends: FingerBends::default(),
            status: "esperando".to_string(),
        }
    }

    // ========== Consultas ==========

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Almacén compartido: otros hilos pueden añadir o borrar ejemplos
    pub fn classifier(&self) -> Arc<GestureClassifier> {
        Arc::clone(&self.classifier)
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.classifier.labels()
    }

    /// Última flexión calculada (FingerSync)
    pub fn finger_bends(&self) -> FingerBends {
        self.bends
    }

    /// Línea de estado del último frame
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn link_state(&self) -> LinkState {
        self.gateway.state()
    }

    pub fn link_status(&self) -> String {
        self.gateway.status()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn gateway_stats(&self) -> GatewayStats {
        self.gateway.stats()
    }

    // ========== Superficie de control ==========

    pub fn connect(&self) -> bool {
        self.gateway.connect()
    }

    pub fn disconnect(&self) {
        self.gateway.disconnect();
    }

    /// Botón "mantener para entrenar"
    pub fn set_hold_train(&mut self, active: bool, label: Option<&str>) {
        if let Some(label) = label {
            self.label_text = label.trim().to_string();
        }
        self.hold_train = active;
        if !active && self.state == RecognitionState::Training {
            self.state = RecognitionState::Idle;
        }
    }

    /// Pide un ejemplo puntual; lo consume el próximo frame con mano
    pub fn add_example(&mut self, label: &str) {
        let label = label.trim();
        if label.is_empty() {
            warn!("⚠️  Etiqueta vacía, ejemplo ignorado");
            return;
        }
        self.pending_examples.push_back(label.to_string());
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        self.pending_examples.retain(|l| l != label);
        let removed = self.classifier.clear_label(label);
        self.status = if removed {
            "datos eliminados".to_string()
        } else {
            format!("etiqueta '{}' no existe", label)
        };
        removed
    }

    pub fn reset_all(&mut self) {
        self.classifier.clear_all();
        self.pending_examples.clear();
        self.state = RecognitionState::Idle;
        self.status = "sin datos".to_string();
    }

    /// Cambiar de modo detiene la transmisión y vuelve a Idle
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        let was_tracking = self.tracking;
        self.tracking = false;
        self.hold_train = false;
        self.pending_examples.clear();
        self.state = RecognitionState::Idle;
        self.mode = mode;
        info!("🔀 Modo {:?}", mode);
        if was_tracking {
            self.gateway.send_stop();
        }
    }

    pub fn set_protocol_variant(&mut self, variant: ProtocolVariant) {
        if let Some(encoding) = variant.finger() {
            self.finger_encoding = encoding;
        }
        if let Some(encoding) = variant.gesture() {
            self.gesture_encoding = encoding;
        }
        info!("📝 Protocolo {:?}", variant);
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn start_transmission(&mut self) {
        self.tracking = true;
        self.status = "analizando datos...".to_string();
        info!("▶️  Transmisión iniciada");
    }

    pub fn stop_transmission(&mut self) -> SendOutcome {
        self.tracking = false;
        self.status = "transmisión detenida".to_string();
        info!("⏹️  Transmisión detenida");
        self.gateway.send_stop()
    }

    pub fn set_flip(&mut self, flip: bool) {
        self.flip = flip;
    }

    // ========== Paso por frame ==========

    pub fn on_frame(&mut self, landmarks: Option<&LandmarkSet>, now: Instant) -> FrameOutcome {
        let Some(landmarks) = landmarks else {
            if self.state == RecognitionState::Classifying {
                self.state = RecognitionState::Idle;
            }
            self.status = "no se detecta la mano".to_string();
            return FrameOutcome::NoHand;
        };

        let hand: Cow<'_, LandmarkSet> = if self.flip {
            Cow::Owned(landmarks.mirrored())
        } else {
            Cow::Borrowed(landmarks)
        };

        match self.mode {
            Mode::FingerSync => self.finger_frame(&hand, now),
            Mode::GestureKnn => self.gesture_frame(&hand, now),
        }
    }

    fn finger_frame(&mut self, hand: &LandmarkSet, now: Instant) -> FrameOutcome {
        self.state = RecognitionState::Classifying;
        self.bends = self.bend_estimator.estimate(hand);

        let message = OutboundMessage::Fingers {
            bends: self.bends,
            encoding: self.finger_encoding,
            threshold: self.digital_threshold,
        };
        let sent = self.transmit(&message, now);
        FrameOutcome::Fingers {
            bends: self.bends,
            sent,
        }
    }

    fn gesture_frame(&mut self, hand: &LandmarkSet, now: Instant) -> FrameOutcome {
        let features = self.extractor.extract(hand);

        if let Some(label) = self.pending_examples.pop_front() {
            return self.train(features, &label);
        }

        if self.hold_train {
            if self.label_text.is_empty() {
                self.state = RecognitionState::Idle;
                return FrameOutcome::Idle;
            }
            self.state = RecognitionState::Training;
            let label = self.label_text.clone();
            return self.train(features, &label);
        }

        // sin etiquetas no se consulta el clasificador
        if self.classifier.num_labels() == 0 {
            self.state = RecognitionState::Idle;
            return FrameOutcome::Idle;
        }

        self.state = RecognitionState::Classifying;
        let result = match self.classifier.classify(&features) {
            Ok(result) => result,
            Err(e) => {
                warn!("⚠️  Error clasificando: {}", e);
                return FrameOutcome::Rejected(e);
            }
        };

        let accepted = result.confidence > self.confidence_threshold;
        debug!(
            "🎯 {} ({:.0}%) aceptado={}",
            result.label,
            result.confidence * 100.0,
            accepted
        );

        let sent = if accepted {
            let message = OutboundMessage::Gesture {
                label: result.label.clone(),
                encoding: self.gesture_encoding,
            };
            self.transmit(&message, now)
        } else {
            if self.tracking {
                self.status = format!("confianza baja: {:.0}%", result.confidence * 100.0);
            }
            None
        };

        FrameOutcome::Classified {
            result,
            accepted,
            sent,
        }
    }

    fn train(&mut self, features: Vec<f32>, label: &str) -> FrameOutcome {
        match self.classifier.add_example(features, label) {
            Ok(info) => {
                self.status = format!("{}: {} ejemplos", info.name, info.count);
                FrameOutcome::Trained(info)
            }
            Err(e) => {
                warn!("⚠️  No se pudo añadir ejemplo a '{}': {}", label, e);
                FrameOutcome::Rejected(e)
            }
        }
    }

    /// Sólo transmite con la transmisión activa; el estado se actualiza
    /// aunque no haya enlace.
    fn transmit(&mut self, message: &OutboundMessage, now: Instant) -> Option<SendOutcome> {
        if !self.tracking {
            return None;
        }

        let mut status = format!("enviando: {}", message.body());
        if !self.gateway.is_connected() {
            status.push_str(" (sin conexión)");
        }
        self.status = status;
        Some(self.gateway.try_send(message, now))
    }
}
