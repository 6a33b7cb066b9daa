use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;
use std::io::BufRead;
use std::process::{Child, ChildStdout, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::normalizer::normalize;
use crate::shell::shell_command;
use crate::types::{FeatureVector, LandmarkSet};

/// Manos detectadas en un frame (puede estar vacío)
pub type Frame = Vec<LandmarkSet>;

/// Frame con el instante en que se leyó de la entrada.
///
/// El enfriamiento usa `received_at`, no la hora de procesado: los frames
/// encolados mientras una acción bloquea conservan su separación real.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedFrame {
    pub received_at: Instant,
    pub hands: Frame,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameLine {
    Hands(Vec<LandmarkSet>),
    Object {
        #[serde(default)]
        hands: Vec<LandmarkSet>,
    },
}

/// Parsea una línea JSON del detector.
///
/// Acepta `[[[x,y,z], ...], ...]` o `{"hands": [...]}`; una línea en blanco
/// es un frame sin manos.
pub fn parse_frame(line: &str) -> Result<Frame, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    Ok(match serde_json::from_str(line)? {
        FrameLine::Hands(hands) => hands,
        FrameLine::Object { hands } => hands,
    })
}

/// Lee frames línea a línea en un hilo y los envía por `tx` sellados con
/// el instante de lectura.
///
/// Las líneas inválidas se registran y se descartan. El hilo termina al
/// cerrarse la entrada o el receptor.
pub fn spawn_reader<R>(reader: R, tx: Sender<TimedFrame>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for (line_no, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("❌ Error leyendo frames: {}", e);
                    break;
                }
            };
            let received_at = Instant::now();
            match parse_frame(&line) {
                Ok(hands) => {
                    if tx.send(TimedFrame { received_at, hands }).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(line = line_no + 1, "⚠️  Frame inválido descartado: {}", e),
            }
        }
        debug!("fin de la entrada de frames");
    })
}

/// Lanza el detector externo; sus frames salen por stdout en JSON lines.
pub fn spawn_detector(command: &str) -> std::io::Result<(Child, ChildStdout)> {
    let mut child = shell_command(command).stdout(Stdio::piped()).spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("el detector no tiene stdout"))?;
    info!(command, "🔌 Detector lanzado");
    Ok((child, stdout))
}

/// Recoge hasta `limit` vectores de las manos que lleguen por `rx`.
///
/// Termina antes si la entrada se cierra; las manos incompletas se ignoran.
pub fn collect_features(rx: &Receiver<TimedFrame>, limit: usize) -> Vec<FeatureVector> {
    let mut collected = Vec::with_capacity(limit.min(4096));
    for frame in rx.iter() {
        for hand in &frame.hands {
            if collected.len() >= limit {
                return collected;
            }
            if let Some(features) = normalize(Some(hand.as_slice())) {
                collected.push(features);
                if collected.len() % 100 == 0 {
                    info!("Recogiendo: {}/{}", collected.len(), limit);
                }
            }
        }
        if collected.len() >= limit {
            break;
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Landmark, NUM_LANDMARKS};
    use crossbeam_channel::unbounded;
    use std::io::Cursor;

    fn hand_json() -> String {
        let points: Vec<String> = (0..NUM_LANDMARKS)
            .map(|i| format!("[{}, 0.5, 0.0]", i as f32 / 100.0))
            .collect();
        format!("[{}]", points.join(","))
    }

    #[test]
    fn test_parse_list_of_hands() {
        let frame = parse_frame(&format!("[{}, {}]", hand_json(), hand_json())).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].len(), NUM_LANDMARKS);
        assert_eq!(frame[0][3], Landmark::new(0.03, 0.5, 0.0));
    }

    #[test]
    fn test_parse_object_form_and_point_objects() {
        let frame = parse_frame(r#"{"hands": [[{"x": 0.1, "y": 0.2, "z": 0.3}]]}"#).unwrap();
        assert_eq!(frame, vec![vec![Landmark::new(0.1, 0.2, 0.3)]]);

        let empty = parse_frame(r#"{"hands": []}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_blank_line_is_no_hand() {
        assert!(parse_frame("   ").unwrap().is_empty());
    }

    fn timed(hands: Frame) -> TimedFrame {
        TimedFrame {
            received_at: Instant::now(),
            hands,
        }
    }

    #[test]
    fn test_collect_features_stops_at_limit() {
        let (tx, rx) = unbounded();
        let hand: LandmarkSet = vec![Landmark::new(0.1, 0.2, 0.3); NUM_LANDMARKS];
        let partial: LandmarkSet = vec![Landmark::new(0.1, 0.2, 0.3); 5];
        tx.send(timed(vec![hand.clone(), partial])).unwrap();
        tx.send(timed(Vec::new())).unwrap();
        tx.send(timed(vec![hand.clone(), hand.clone()])).unwrap();
        tx.send(timed(vec![hand])).unwrap();
        drop(tx);

        let features = collect_features(&rx, 2);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].len(), 63);
    }

    #[test]
    fn test_collect_features_ends_with_input() {
        let (tx, rx) = unbounded::<TimedFrame>();
        tx.send(timed(vec![vec![Landmark::default(); NUM_LANDMARKS]])).unwrap();
        drop(tx);
        assert_eq!(collect_features(&rx, 1000).len(), 1);
    }

    #[test]
    fn test_reader_skips_invalid_lines() {
        let input = format!("[{}]\nnot json\n\n", hand_json());
        let (tx, rx) = unbounded();
        spawn_reader(Cursor::new(input), tx).join().unwrap();

        let frames: Vec<TimedFrame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].hands.len(), 1);
        assert!(frames[1].hands.is_empty());
    }

    #[test]
    fn test_frames_are_stamped_when_read() {
        let before = Instant::now();
        let input = format!("[{}]\n[]\n", hand_json());
        let (tx, rx) = unbounded();
        spawn_reader(Cursor::new(input), tx).join().unwrap();
        let after = Instant::now();

        // el consumidor llega tarde, pero el sello es el de lectura
        std::thread::sleep(std::time::Duration::from_millis(50));
        let frames: Vec<TimedFrame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert!(frame.received_at >= before && frame.received_at <= after);
        }
        assert!(frames[0].received_at <= frames[1].received_at);
    }

    #[cfg(unix)]
    #[test]
    fn test_detector_output_goes_through_shell() {
        let (mut child, stdout) = spawn_detector("printf '[]\\n[]\\n'").unwrap();
        let (tx, rx) = unbounded();
        spawn_reader(std::io::BufReader::new(stdout), tx).join().unwrap();
        child.wait().unwrap();

        let frames: Vec<TimedFrame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.hands.is_empty()));
    }
}
