//! Pasarela de transporte: serializa mensajes, limita la tasa de envío y
//! garantiza una sola escritura pendiente sobre el enlace.
//!
//! Las operaciones del enlace (handshake y cada escritura) corren en un hilo
//! propio; el hilo de frames nunca se bloquea esperando al transporte.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, error, info, warn};

use crate::ble::{Link, LinkError};
use crate::protocol::OutboundMessage;

/// Intervalo mínimo entre envíos
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Qué pasó con un intento de envío. Nada se encola: lo descartado se pierde.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    NotConnected,
    RateLimited,
    Busy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub sent: u32,
    pub rate_limited: u32,
    pub busy: u32,
    pub not_connected: u32,
    pub failed: u32,
}

struct LinkStatus {
    state: LinkState,
    status: String,
    /// Cambia en cada connect/disconnect; los resultados de épocas viejas se descartan
    epoch: u64,
}

struct Shared {
    link: Mutex<LinkStatus>,
    in_flight: AtomicBool,
    last_send: Mutex<Option<Instant>>,
    stats: Mutex<GatewayStats>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, LinkStatus> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, GatewayStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Libera el flag de escritura en curso pase lo que pase con la escritura
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Job {
    Connect { epoch: u64 },
    Write { frame: Vec<u8>, epoch: u64 },
    Disconnect,
    Shutdown,
}

pub struct Gateway {
    shared: Arc<Shared>,
    jobs: Sender<Job>,
    worker: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Gateway {
    pub fn new(link: Box<dyn Link>, interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            link: Mutex::new(LinkStatus {
                state: LinkState::Disconnected,
                status: "esperando conexión".to_string(),
                epoch: 0,
            }),
            in_flight: AtomicBool::new(false),
            last_send: Mutex::new(None),
            stats: Mutex::new(GatewayStats::default()),
        });

        let (tx, rx) = unbounded::<Job>();
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            let mut link = link;
            for job in rx.iter() {
                match job {
                    Job::Connect { epoch } => handle_connect(&worker_shared, link.as_mut(), epoch),
                    Job::Write { frame, epoch } => {
                        handle_write(&worker_shared, link.as_mut(), &frame, epoch)
                    }
                    Job::Disconnect => link.disconnect(),
                    Job::Shutdown => {
                        link.disconnect();
                        break;
                    }
                }
            }
        });

        Self {
            shared,
            jobs: tx,
            worker: Some(worker),
            interval,
        }
    }

    pub fn state(&self) -> LinkState {
        self.shared.link().state
    }

    /// Estado legible para la interfaz
    pub fn status(&self) -> String {
        self.shared.link().status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    pub fn in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> GatewayStats {
        *self.shared.stats()
    }

    /// Inicia el handshake. Sólo desde Disconnected o Error; sin reintentos automáticos.
    pub fn connect(&self) -> bool {
        let epoch = {
            let mut link = self.shared.link();
            if matches!(link.state, LinkState::Connecting | LinkState::Connected) {
                return false;
            }
            link.state = LinkState::Connecting;
            link.status = "conectando...".to_string();
            link.epoch += 1;
            link.epoch
        };

        info!("🔌 Conectando enlace...");
        if self.jobs.send(Job::Connect { epoch }).is_err() {
            self.fail_link("hilo de enlace terminado");
            return false;
        }
        true
    }

    /// Desconecta ya: los envíos pendientes y futuros pasan a ser no-ops.
    /// Una escritura en curso puede terminar; su resultado se descarta.
    pub fn disconnect(&self) {
        {
            let mut link = self.shared.link();
            link.state = LinkState::Disconnected;
            link.status = "desconectado".to_string();
            link.epoch += 1;
        }
        info!("🔌 Enlace desconectado");
        let _ = self.jobs.send(Job::Disconnect);
    }

    /// Envío con límite de tasa (`now` permite tiempo simulado)
    pub fn try_send(&self, message: &OutboundMessage, now: Instant) -> SendOutcome {
        self.dispatch(message, Some(now))
    }

    /// `stop` ignora el límite de tasa (y no cuenta para él) pero respeta
    /// la escritura en curso
    pub fn send_stop(&self) -> SendOutcome {
        self.dispatch(&OutboundMessage::Stop, None)
    }

    fn dispatch(&self, message: &OutboundMessage, now: Option<Instant>) -> SendOutcome {
        let epoch = {
            let link = self.shared.link();
            if link.state != LinkState::Connected {
                self.shared.stats().not_connected += 1;
                return SendOutcome::NotConnected;
            }
            link.epoch
        };

        let mut last_send = self.shared.last_send.lock().unwrap_or_else(PoisonError::into_inner);
        if let (Some(now), Some(last)) = (now, *last_send) {
            if now.saturating_duration_since(last) <= self.interval {
                self.shared.stats().rate_limited += 1;
                return SendOutcome::RateLimited;
            }
        }

        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.shared.stats().busy += 1;
            return SendOutcome::Busy;
        }

        let frame = message.to_frame();
        debug!("📤 {:?}", String::from_utf8_lossy(&frame));
        if self.jobs.send(Job::Write { frame, epoch }).is_err() {
            self.shared.in_flight.store(false, Ordering::Release);
            self.shared.stats().failed += 1;
            error!("❌ Hilo de enlace terminado, trama descartada");
            return SendOutcome::NotConnected;
        }

        if now.is_some() {
            *last_send = now;
        }
        self.shared.stats().sent += 1;
        SendOutcome::Sent
    }

    /// Espera a que no haya handshake ni escritura pendiente
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !self.in_flight() && self.state() != LinkState::Connecting {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn fail_link(&self, reason: &str) {
        let mut link = self.shared.link();
        link.state = LinkState::Error;
        link.status = format!("error de enlace: {}", reason);
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn handle_connect(shared: &Shared, link: &mut dyn Link, epoch: u64) {
    let result = link.connect();
    let mut status = shared.link();
    let current = status.epoch == epoch && status.state == LinkState::Connecting;

    match result {
        Ok(name) if current => {
            status.state = LinkState::Connected;
            status.status = format!("conectado: {}", name);
            info!("✅ Conectado a {}", name);
        }
        Ok(name) => {
            // desconectado mientras se conectaba
            drop(status);
            debug!("Handshake con {} obsoleto, cerrando", name);
            link.disconnect();
        }
        Err(e) if current => {
            status.state = LinkState::Error;
            status.status = "conexión fallida".to_string();
            error!("❌ No se pudo conectar: {}", e);
        }
        Err(e) => debug!("Handshake obsoleto falló: {}", e),
    }
}

fn handle_write(shared: &Shared, link: &mut dyn Link, frame: &[u8], epoch: u64) {
    let _guard = InFlightGuard(&shared.in_flight);

    if shared.link().epoch != epoch {
        debug!("Trama descartada: el enlace cambió antes de escribir");
        return;
    }

    if let Err(e) = link.write(frame) {
        shared.stats().failed += 1;
        let mut status = shared.link();
        if status.epoch != epoch {
            return;
        }
        warn!("⚠️  Error enviando trama: {}", e);
        if matches!(e, LinkError::NotConnected) {
            status.state = LinkState::Disconnected;
            status.status = "enlace perdido".to_string();
            status.epoch += 1;
        }
    }
}
