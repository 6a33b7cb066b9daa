/*
quirocontrol - control del sistema con gestos de mano

El detector de landmarks (p. ej. MediaPipe) es un proceso externo que escribe
un frame por línea en JSON: [[[x,y,z] x21], ...] con una lista por mano.

Uso típico:
    quirocontrol collect puño --detector "python3 detector.py"
    quirocontrol train
    quirocontrol commands set puño volumeup
    quirocontrol run --detector "python3 detector.py"

Para /dev/uinput hace falta pertenecer al grupo input:
    sg input -c 'quirocontrol run'
*/

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver};
use std::io::BufReader;
use std::path::PathBuf;
use std::process::Child;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quirocontrol::config::EXAMPLE_CONFIG;
use quirocontrol::hid::{HidOutput, KeyInjector, UnavailableInput};
use quirocontrol::pipeline::FrameOutcome;
use quirocontrol::shell::ShellRunner;
use quirocontrol::source::{collect_features, spawn_detector, spawn_reader, TimedFrame};
use quirocontrol::{
    ActionDescriptor, ActionRegistry, Config, DatasetStore, DebounceGate, Dispatcher,
    GestureClassifier, GesturePipeline,
};

const FRAME_QUEUE: usize = 100;

#[derive(Parser)]
#[command(name = "quirocontrol")]
#[command(version)]
#[command(about = "Reconocimiento de gestos de mano con disparo de acciones")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Archivo de configuración TOML
    #[arg(short, long, global = true, default_value = "quirocontrol.toml")]
    config: PathBuf,

    /// Salida detallada
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Reconoce gestos y ejecuta sus acciones
    Run {
        /// Comando del detector; por defecto se leen frames de stdin
        #[arg(long)]
        detector: Option<String>,
    },

    /// Recoge muestras de un gesto
    Collect {
        gesture: String,

        /// Número de manos a recoger
        #[arg(short, long)]
        samples: Option<usize>,

        #[arg(long)]
        detector: Option<String>,
    },

    /// Entrena el modelo con el dataset y lo guarda
    Train {
        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Borra las muestras de un gesto
    DeleteGesture { gesture: String },

    /// Borra todo el dataset y el modelo entrenado
    Clear,

    /// Gestiona el mapa gesto → acción
    Commands {
        #[command(subcommand)]
        action: CommandsAction,
    },

    /// Muestra una configuración de ejemplo
    ExampleConfig,
}

#[derive(Subcommand)]
enum CommandsAction {
    List,
    /// Acciones de sistema: volumeup, volumedown, right, left, ok, space, fist.
    /// Cualquier otro texto se ejecuta en la shell.
    Set { gesture: String, action: String },
    Delete { gesture: String },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Frames desde el detector o stdin, por un canal acotado
fn frame_input(detector: Option<&str>) -> Result<(Receiver<TimedFrame>, Option<Child>)> {
    let (tx, rx) = bounded::<TimedFrame>(FRAME_QUEUE);
    match detector {
        Some(command) => {
            let (child, stdout) = spawn_detector(command)
                .with_context(|| format!("No se pudo lanzar el detector `{}`", command))?;
            spawn_reader(BufReader::new(stdout), tx);
            Ok((rx, Some(child)))
        }
        None => {
            info!("Leyendo frames de stdin");
            spawn_reader(BufReader::new(std::io::stdin()), tx);
            Ok((rx, None))
        }
    }
}

fn reap(child: Option<Child>) {
    if let Some(mut child) = child {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn run(config: &Config, detector: Option<&str>) -> Result<()> {
    let dataset = DatasetStore::open(&config.paths.dataset)?;
    let labels = dataset.labels().clone();
    if labels.is_empty() {
        warn!("⚠️  El dataset está vacío: ningún gesto se reconocerá con sentido");
    }

    let classifier = GestureClassifier::load_or_create(&config.paths.model, labels.width())
        .with_threshold(config.recognition.confidence_threshold);
    let registry = ActionRegistry::open(&config.paths.commands)?;

    let keys: Box<dyn KeyInjector> = match HidOutput::new(config.actions.key_press_delay()) {
        Ok(hid) => Box::new(hid),
        Err(e) => {
            warn!("❌ No se pudo inicializar HID: {}", e);
            Box::new(UnavailableInput::new(e.to_string()))
        }
    };
    let dispatcher = Dispatcher::new(
        DebounceGate::new(config.recognition.debounce_window()),
        registry,
        keys,
        Box::new(ShellRunner::new(config.actions.shell_timeout())),
    );
    let mut pipeline = GesturePipeline::new(classifier, labels, dispatcher);

    let (rx, child) = frame_input(detector)?;
    info!("🎬 Iniciando reconocimiento en tiempo real...");

    let mut frames = 0u64;
    let mut failures = 0u64;
    for frame in rx.iter() {
        frames += 1;
        for outcome in pipeline.process_frame(&frame.hands, frame.received_at) {
            if let FrameOutcome::Failed { .. } = outcome {
                failures += 1;
            }
        }
    }

    info!(frames, failures, "👋 Entrada cerrada, saliendo");
    reap(child);
    Ok(())
}

fn collect(config: &Config, gesture: &str, samples: usize, detector: Option<&str>) -> Result<()> {
    let mut dataset = DatasetStore::open(&config.paths.dataset)?;
    let (rx, child) = frame_input(detector)?;

    info!("Recogiendo datos para el gesto: {} ({} muestras)", gesture, samples);
    let features = collect_features(&rx, samples);
    reap(child);

    if features.is_empty() {
        warn!("⚠️  No llegó ninguna mano; no se guarda nada para {}", gesture);
        return Ok(());
    }
    if features.len() < samples {
        warn!("⚠️  La entrada terminó con {}/{} muestras", features.len(), samples);
    }
    let label = dataset.append_batch(gesture, features)?;
    info!(
        "✅ Datos guardados para {} (ID: {}, total: {})",
        gesture,
        label,
        dataset.sample_count(gesture)
    );
    Ok(())
}

fn train(config: &Config, epochs: Option<usize>, batch_size: Option<usize>) -> Result<()> {
    let dataset = DatasetStore::open(&config.paths.dataset)?;
    if dataset.samples().is_empty() {
        bail!("No hay datos de gestos. Recoge muestras antes de entrenar.");
    }

    let mut params = config.training.params();
    params.epochs = epochs.unwrap_or(params.epochs);
    params.batch_size = batch_size.unwrap_or(params.batch_size);

    info!(
        samples = dataset.samples().len(),
        classes = dataset.labels().width(),
        epochs = params.epochs,
        "🔧 Entrenando modelo..."
    );
    let (model, report) =
        GestureClassifier::train(dataset.samples(), dataset.labels().width(), params)?;
    for (idx, epoch) in report.epochs.iter().enumerate() {
        info!(
            "Época {:>3}/{}: loss={:.4} acc={:.2}%",
            idx + 1,
            params.epochs,
            epoch.loss,
            epoch.accuracy * 100.0
        );
    }
    model.save(&config.paths.model)?;
    info!("✅ Entrenamiento completo");
    Ok(())
}

fn commands(config: &Config, action: CommandsAction) -> Result<()> {
    let registry = ActionRegistry::open(&config.paths.commands)?;
    match action {
        CommandsAction::List => {
            let entries = registry.list()?;
            let json: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|(gesture, descriptor)| (gesture, descriptor.to_string().into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        CommandsAction::Set { gesture, action } => {
            registry.set(&gesture, ActionDescriptor::parse(&action))?;
            println!("Comando añadido: {} -> {}", gesture, action);
        }
        CommandsAction::Delete { gesture } => {
            if registry.delete(&gesture)? {
                println!("Asignación borrada para: {}", gesture);
            } else {
                println!("El gesto '{}' no tiene acción asignada", gesture);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let load_config = || {
        Config::load_or_default(&cli.config)
            .with_context(|| format!("Cargando {}", cli.config.display()))
    };

    match cli.command {
        Command::Run { detector } => run(&load_config()?, detector.as_deref()),
        Command::Collect {
            gesture,
            samples,
            detector,
        } => {
            let config = load_config()?;
            let samples = samples.unwrap_or(config.training.samples_per_gesture);
            collect(&config, &gesture, samples, detector.as_deref())
        }
        Command::Train { epochs, batch_size } => train(&load_config()?, epochs, batch_size),
        Command::DeleteGesture { gesture } => {
            let config = load_config()?;
            let mut dataset = DatasetStore::open(&config.paths.dataset)?;
            if dataset.delete(&gesture)? {
                println!("Datos borrados para: {}", gesture);
            } else {
                println!("El gesto '{}' no está en el dataset", gesture);
            }
            Ok(())
        }
        Command::Clear => {
            let config = load_config()?;
            // un dataset ilegible también se borra
            let mut dataset = DatasetStore::open(&config.paths.dataset).unwrap_or_else(|e| {
                warn!("⚠️  {}", e);
                DatasetStore::empty(&config.paths.dataset)
            });
            dataset.clear_all(&config.paths.model)?;
            println!("Todos los datos de gestos y el modelo han sido borrados");
            Ok(())
        }
        Command::Commands { action } => commands(&load_config()?, action),
        // no necesita leer la configuración: sirve para crearla
        Command::ExampleConfig => {
            print!("{}", EXAMPLE_CONFIG);
            Ok(())
        }
    }
}
