/*
Reconocimiento de gestos de mano -> periférico BLE (Nordic UART)

El daemon recibe por stdin una línea JSON por frame con los 21 landmarks que
produce el estimador de pose, más comandos de control (entrenar, conectar,
iniciar transmisión...). Clasifica con k-NN entrenado en vivo o mide la
flexión de los dedos, y envía tramas de texto al periférico a como mucho una
cada 100 ms.

Uso:
    quirolink [--config config.json] [MAC]

Sin MAC (ni "device" en la configuración) corre en modo simulado: las tramas
quedan en memoria y se informan en el log.

    RUST_LOG=debug ./target/release/quirolink E3:5A:12:00:00:01 < frames.jsonl
*/

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, select, tick};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quirolink::ble::{BluezUartLink, Link, MemoryLink};
use quirolink::config::Config;
use quirolink::controller::{FrameOutcome, RecognitionController};
use quirolink::input::{apply, Input};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

struct Args {
    config: Option<PathBuf>,
    device: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut config = None;
    let mut device = None;
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config requiere una ruta")?;
                config = Some(PathBuf::from(path));
            }
            _ if arg.starts_with("--") => bail!("Uso: quirolink [--config <archivo.json>] [MAC]"),
            _ => {
                if device.is_some() {
                    bail!("Uso: quirolink [--config <archivo.json>] [MAC]");
                }
                device = Some(arg);
            }
        }
    }

    Ok(Args { config, device })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🎯 Reconocimiento de gestos -> BLE UART");

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => Config::default(),
    };

    let device = args.device.or_else(|| config.device.clone());
    let memory = MemoryLink::new();
    let link: Box<dyn Link> = match &device {
        Some(mac) => {
            info!("🔧 Modo: BLE ({} vía {})", mac, config.adapter);
            Box::new(BluezUartLink::new(&config.adapter, mac))
        }
        None => {
            info!("🔧 Modo: simulado (sin dispositivo)");
            Box::new(memory.clone())
        }
    };

    let mut controller = RecognitionController::new(&config, link);
    info!(
        "✅ Controlador listo: modo {:?}, umbral {:.2}, k={}",
        controller.mode(),
        config.confidence_threshold,
        config.k
    );

    // Hilo lector de stdin
    let (tx, rx) = bounded::<Input>(64);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for (line_no, line) in stdin.lock().lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("❌ Error leyendo stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match Input::parse(&line) {
                Ok(input) => {
                    if tx.send(input).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("⚠️  Línea {} ignorada: {}", line_no + 1, e),
            }
        }
    });

    let ticker = tick(STATUS_INTERVAL);
    let mut frames_received = 0u64;
    let mut frames_without_hand = 0u64;
    let mut last_label: Option<String> = None;

    loop {
        select! {
            recv(rx) -> msg => {
                let Ok(input) = msg else {
                    info!("👋 Fin de la entrada");
                    break;
                };

                match apply(&mut controller, input, Instant::now()) {
                    Ok(Some(outcome)) => {
                        frames_received += 1;
                        match outcome {
                            FrameOutcome::NoHand => frames_without_hand += 1,
                            FrameOutcome::Classified { result, accepted: true, .. } => {
                                if last_label.as_deref() != Some(result.label.as_str()) {
                                    info!(
                                        "[GESTO] {} (conf: {:.0}%)",
                                        result.label,
                                        result.confidence * 100.0
                                    );
                                    last_label = Some(result.label);
                                }
                            }
                            _ => {}
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("⚠️  Frame descartado: {}", e),
                }
            }
            recv(ticker) -> _ => {
                let stats = controller.gateway_stats();
                info!(
                    "[📊 STATS] frames={} sin_mano={} enlace='{}' enviados={} limitados={} ocupado={} fallidos={} | {}",
                    frames_received,
                    frames_without_hand,
                    controller.link_status(),
                    stats.sent,
                    stats.rate_limited,
                    stats.busy,
                    stats.failed,
                    controller.status()
                );
            }
        }
    }

    if controller.is_tracking() {
        controller.stop_transmission();
    }
    controller.gateway().wait_until_idle(Duration::from_secs(2));
    controller.disconnect();

    if device.is_none() {
        let frames = memory.frames();
        info!("🧾 {} tramas simuladas", frames.len());
        for frame in frames.iter().rev().take(10).rev() {
            info!("   {}", frame);
        }
    }

    Ok(())
}
