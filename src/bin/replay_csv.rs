use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use quirolink::ble::MemoryLink;
use quirolink::config::Config;
use quirolink::controller::{FrameOutcome, Mode, RecognitionController};
use quirolink::csv_loader::{load_hands, load_recording};
use quirolink::feature_extractor::NormalizationMode;
use quirolink::gateway::SendOutcome;
use quirolink::protocol::ProtocolVariant;
use tracing_subscriber::EnvFilter;

/// Cadencia simulada de la cámara
const FRAME_PERIOD: Duration = Duration::from_millis(33);

struct ReplayOptions {
    training: Vec<(String, PathBuf)>,
    query: PathBuf,
    config: Config,
    protocol: Option<ProtocolVariant>,
}

const USAGE: &str = "Uso: replay_csv [--config c.json] [--full] [--fingers] [--protocol p] \
                     <label=entrenamiento.csv>... --query <consulta.csv>";

fn parse_args() -> Result<ReplayOptions> {
    let mut training = Vec::new();
    let mut query = None;
    let mut config = Config::default();
    let mut protocol = None;
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--query" => query = Some(PathBuf::from(args.next().context(USAGE)?)),
            "--config" => {
                let path = args.next().context(USAGE)?;
                config = Config::load(&path)
                    .with_context(|| format!("No se pudo cargar {}", path))?;
            }
            "--full" => config.normalization = NormalizationMode::Full,
            "--fingers" => config.mode = Mode::FingerSync,
            "--protocol" => {
                let name = args.next().context(USAGE)?;
                let variant: ProtocolVariant = serde_json::from_value(serde_json::Value::String(name.clone()))
                    .map_err(|_| anyhow!("Protocolo desconocido: {}", name))?;
                protocol = Some(variant);
            }
            _ => {
                let (label, path) = arg.split_once('=').ok_or_else(|| anyhow!(USAGE))?;
                training.push((label.to_string(), PathBuf::from(path)));
            }
        }
    }

    let query = query.ok_or_else(|| anyhow!("Debes especificar --query <archivo.csv>"))?;
    if config.mode == Mode::GestureKnn && training.is_empty() {
        bail!("{}", USAGE);
    }

    Ok(ReplayOptions {
        training,
        query,
        config,
        protocol,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let opts = parse_args()?;
    println!("🎞️  Reproduciendo {:?}", opts.query);

    let link = MemoryLink::new();
    let mut controller = RecognitionController::new(&opts.config, Box::new(link.clone()));
    if let Some(variant) = opts.protocol {
        controller.set_protocol_variant(variant);
    }

    let mut now = Instant::now();
    for (label, path) in &opts.training {
        let hands = load_hands(path)?;
        for hand in &hands {
            controller.add_example(label);
            if let FrameOutcome::Rejected(e) = controller.on_frame(Some(hand), now) {
                bail!("Ejemplo rechazado para '{}': {}", label, e);
            }
        }
        println!("🏷️  {:<16} {:>4} ejemplos ({:?})", label, hands.len(), path);
    }

    controller.connect();
    if !controller.gateway().wait_until_idle(Duration::from_secs(2)) {
        bail!("El enlace simulado no respondió");
    }
    controller.start_transmission();

    let recording = load_recording(&opts.query)?;
    println!("\n{:>6}  {:<20} {:>6}  envío", "frame", "resultado", "conf");
    for (frame_idx, hand) in &recording {
        now += FRAME_PERIOD;
        let outcome = controller.on_frame(hand.as_ref(), now);
        let (label, conf, sent) = match &outcome {
            FrameOutcome::NoHand => ("(sin mano)".to_string(), None, None),
            FrameOutcome::Classified {
                result,
                accepted,
                sent,
            } => {
                let mark = if *accepted { "" } else { " ·" };
                (format!("{}{}", result.label, mark), Some(result.confidence), *sent)
            }
            FrameOutcome::Fingers { bends, sent } => {
                let values: Vec<String> = bends.values.iter().map(|v| format!("{:.0}", v)).collect();
                (values.join("/"), None, *sent)
            }
            FrameOutcome::Rejected(e) => (format!("error: {}", e), None, None),
            other => (format!("{:?}", other), None, None),
        };

        let conf = conf
            .map(|c| format!("{:.1}%", c * 100.0))
            .unwrap_or_default();
        let sent = match sent {
            Some(SendOutcome::Sent) => "📤",
            Some(SendOutcome::RateLimited) => "⏱",
            Some(SendOutcome::Busy) => "⌛",
            Some(SendOutcome::NotConnected) => "✗",
            None => "",
        };
        println!("{:>6}  {:<20} {:>6}  {}", frame_idx, label, conf, sent);

        // El replay es más rápido que el enlace: esperar a que termine cada escritura
        controller.gateway().wait_until_idle(Duration::from_secs(1));
    }

    controller.stop_transmission();
    controller.gateway().wait_until_idle(Duration::from_secs(1));

    let frames = link.frames();
    println!("\n🧾 {} tramas emitidas:", frames.len());
    for frame in &frames {
        println!("  {}", frame);
    }

    Ok(())
}
