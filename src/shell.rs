use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("No se pudo lanzar `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` terminó con código {code:?}")]
    ExitStatus { command: String, code: Option<i32> },

    #[error("Error esperando a `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Ejecuta comandos externos configurados por el usuario
pub trait CommandRunner {
    fn run(&mut self, command: &str) -> Result<(), ShellError>;
}

/// Pasa el texto tal cual a la shell del sistema.
///
/// Espera como mucho `timeout`; si el comando sigue vivo se desengancha a un
/// hilo que lo recoge al terminar y se da por lanzado.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// `sh -c` (o `cmd /C` en Windows) con stdin cerrado; lo comparten acciones y detector.
pub(crate) fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.stdin(Stdio::null());
    cmd
}

fn detach(mut child: Child, command: String) {
    thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => {
            warn!(command = %command, code = ?status.code(), "❌ Comando en segundo plano falló")
        }
        Ok(_) => debug!(command = %command, "comando en segundo plano terminado"),
        Err(e) => warn!(command = %command, "❌ Error esperando comando: {}", e),
    });
}

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> Result<(), ShellError> {
        let mut child = shell_command(command)
            .spawn()
            .map_err(|source| ShellError::Launch {
                command: command.to_string(),
                source,
            })?;

        // sin deadline representable se espera sin límite
        let deadline = Instant::now().checked_add(self.timeout);
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(ShellError::ExitStatus {
                        command: command.to_string(),
                        code: status.code(),
                    })
                }
                Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                    debug!(command, "comando largo, sigue en segundo plano");
                    detach(child, command.to_string());
                    return Ok(());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    return Err(ShellError::Wait {
                        command: command.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ShellRunner {
        ShellRunner::new(Duration::from_secs(2))
    }

    #[test]
    fn test_successful_command() {
        assert!(runner().run("true").is_ok());
    }

    #[test]
    fn test_non_zero_exit_is_error() {
        let err = runner().run("exit 3").unwrap_err();
        assert!(matches!(err, ShellError::ExitStatus { code: Some(3), .. }));
    }

    #[test]
    fn test_command_runs_through_shell() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let command = format!("echo hola > '{}'", marker.display());
        runner().run(&command).unwrap();
        assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "hola");
    }

    #[test]
    fn test_unrepresentable_timeout_still_waits() {
        let mut runner = ShellRunner::new(Duration::MAX);
        assert!(runner.run("true").is_ok());
        assert!(matches!(
            runner.run("exit 4"),
            Err(ShellError::ExitStatus { code: Some(4), .. })
        ));
    }

    #[test]
    fn test_long_command_is_detached() {
        let mut runner = ShellRunner::new(Duration::from_millis(50));
        let started = Instant::now();
        assert!(runner.run("sleep 2").is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
