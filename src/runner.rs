// src/runner.rs
use crate::errors::{RelayError, Result};
use std::io::{BufRead, BufReader, PipeReader};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Lines waiting for the consumer before the reader stops pulling from the child.
const LINE_QUEUE_CAPACITY: usize = 256;

/// Launches the processing executable against one input file.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Start `<program> <input>` and return its combined stdout/stderr as a line sequence.
    ///
    /// Both streams share one pipe, so lines come back in the order the child wrote them.
    pub fn spawn(&self, input: &Path) -> Result<OutputLines> {
        let (reader, writer) = std::io::pipe()?;
        let stderr = writer.try_clone()?;

        let mut command = Command::new(&self.program);
        command
            .arg(input)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr)
            .kill_on_drop(true);
        let spawned = command.spawn();
        // The command still holds our copies of the write end; the reader only
        // sees end-of-file once the child's copies are the last ones.
        drop(command);

        let child = spawned.map_err(|source| RelayError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        std::thread::Builder::new()
            .name("videorelay-output".to_string())
            .spawn(move || forward_lines(reader, tx))?;

        log::info!(
            "Spawned {} {} (pid {:?})",
            self.program.display(),
            input.display(),
            child.id()
        );

        Ok(OutputLines { child, rx })
    }
}

/// Read the pipe line by line into `tx` until end-of-file or the receiver goes away.
fn forward_lines(pipe: PipeReader, tx: mpsc::Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if tx.blocking_send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

/// The combined output of one running child process.
///
/// Finite and single-use: it ends once every holder of the pipe has closed it.
#[derive(Debug)]
pub struct OutputLines {
    child: Child,
    rx: mpsc::Receiver<std::io::Result<String>>,
}

impl OutputLines {
    /// Next line of output, or `None` once the child has closed its output.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        match self.rx.recv().await {
            Some(line) => Ok(Some(line?)),
            None => Ok(None),
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        self.rx.close();
        Ok(self.child.wait().await?)
    }

    /// Kill the child and reap it.
    pub async fn kill(mut self) -> Result<()> {
        self.rx.close();
        self.child.kill().await?;
        Ok(())
    }
}
