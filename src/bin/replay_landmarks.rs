use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use quirocontrol::normalizer::normalize;
use quirocontrol::source::parse_frame;
use quirocontrol::{Config, DatasetStore, GestureClassifier};

struct ReplayOptions {
    config: PathBuf,
    dump_features: bool,
}

const USAGE: &str = "Uso: replay_landmarks [--config <archivo.toml>] [--dump-features] <frames.jsonl>";

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut dump_features = false;
    let mut config = PathBuf::from("quirocontrol.toml");
    let mut frames_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump-features" => dump_features = true,
            "--config" => {
                config = args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?;
            }
            _ => {
                if frames_path.is_some() {
                    bail!(USAGE);
                }
                frames_path = Some(PathBuf::from(arg));
            }
        }
    }

    let frames_path =
        frames_path.ok_or_else(|| anyhow!("Debes especificar un archivo de frames"))?;
    Ok((
        frames_path,
        ReplayOptions {
            config,
            dump_features,
        },
    ))
}

fn main() -> Result<()> {
    let (frames_path, opts) = parse_args()?;
    println!("🎞️  Reproduciendo frames desde {:?}", frames_path);

    let config = Config::load_or_default(&opts.config)?;
    let dataset = DatasetStore::open(&config.paths.dataset)?;
    let labels = dataset.labels();
    let classifier = GestureClassifier::load(&config.paths.model, labels.width())
        .context("Entrena el modelo antes de reproducir frames")?
        .with_threshold(config.recognition.confidence_threshold);
    let widths: Vec<String> = classifier.architecture().iter().map(|w| w.to_string()).collect();
    println!("🧠 Modelo: {}", widths.join(" → "));

    let content = fs::read_to_string(&frames_path)
        .with_context(|| format!("No se pudo leer {:?}", frames_path))?;

    let mut recognized = 0usize;
    let mut hands_seen = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        let frame = match parse_frame(line) {
            Ok(frame) => frame,
            Err(e) => {
                println!("⚠️  Línea {}: frame inválido ({})", line_no + 1, e);
                continue;
            }
        };

        for (hand_idx, hand) in frame.iter().enumerate() {
            let Some(features) = normalize(Some(hand.as_slice())) else {
                println!("  línea {} mano {}: sin observación", line_no + 1, hand_idx);
                continue;
            };
            hands_seen += 1;

            let mut scores: Vec<(&str, f32)> = classifier
                .predict_scores(&features)?
                .into_iter()
                .enumerate()
                .map(|(id, score)| (labels.resolve_name(id), score))
                .collect();
            scores.sort_by(|a, b| b.1.total_cmp(&a.1));

            let (best_label, best_conf) = scores
                .first()
                .copied()
                .ok_or_else(|| anyhow!("El modelo no devolvió probabilidades"))?;
            let accepted = best_conf > classifier.threshold();
            if accepted {
                recognized += 1;
            }

            println!(
                "\n🥇 Línea {} mano {}: {} ({:.1}%){}",
                line_no + 1,
                hand_idx,
                best_label,
                best_conf * 100.0,
                if accepted { "" } else { " [bajo umbral]" }
            );
            println!("Top-5 probabilidades:");
            for (idx, (label, score)) in scores.iter().take(5).enumerate() {
                println!("  {:>2}. {:<25} {:>6.2}%", idx + 1, label, score * 100.0);
            }

            if opts.dump_features {
                println!("Features ({}):", features.len());
                for chunk in features.chunks(3) {
                    println!("  {:?}", chunk);
                }
            }
        }
    }

    println!(
        "\n✅ {} manos, {} reconocidas por encima de {:.0}%",
        hands_seen,
        recognized,
        classifier.threshold() * 100.0
    );
    Ok(())
}
