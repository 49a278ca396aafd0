//! Process execution core.
//!
//! Spawns one command line through `sh -c`, drains stdout and stderr
//! concurrently into a single combined buffer, streams complete lines to an
//! [`OutputSink`] as they arrive, and returns a [`CommandResult`].
//!
//! Each pipe has its own reader thread feeding a channel; the controlling
//! thread blocks on that channel, which is the readiness wait. Neither pipe can
//! fill up and stall the child while the other is being read.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const READ_CHUNK: usize = 4096;

/// Outcome of one spawned process. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub exit_status: i32,
    pub output: String,
}

impl CommandResult {
    pub fn new(command: impl Into<String>, exit_status: i32, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_status,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Operator-facing rendering used in aggregated failures.
    pub fn inspect(&self) -> String {
        format!(
            "$ {}\n# => {}\n\n{}\n",
            self.command, self.exit_status, self.output
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Line-oriented receiver for live process output.
pub trait OutputSink {
    fn line(&mut self, stream: Stream, line: &str);
}

/// Default sink: stdout at debug, stderr at info.
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&mut self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => tracing::debug!("     {}", line),
            Stream::Stderr => tracing::info!("     {}", line),
        }
    }
}

/// Keeps every line it receives, tagged with its stream.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub lines: Vec<(Stream, String)>,
}

impl CollectingSink {
    pub fn stream_lines(&self, stream: Stream) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l.as_str())
            .collect()
    }
}

impl OutputSink for CollectingSink {
    fn line(&mut self, stream: Stream, line: &str) {
        self.lines.push((stream, line.to_string()));
    }
}

/// Splits a byte stream into lines, holding back a trailing partial line.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8], mut emit: impl FnMut(&str)) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            emit(text.trim_end_matches('\r'));
        }
    }

    fn flush(&mut self, mut emit: impl FnMut(&str)) {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            emit(text.trim_end_matches('\r'));
        }
    }
}

enum Event {
    Data(Stream, Vec<u8>),
    Closed(Stream),
}

/// Run `command` with the default tracing sink.
pub fn spawn(command: &str) -> Result<CommandResult> {
    Spawn::new(command).run(&mut TracingSink)
}

/// Run `command`, streaming its lines to `sink`.
pub fn spawn_with_sink(command: &str, sink: &mut dyn OutputSink) -> Result<CommandResult> {
    Spawn::new(command).run(sink)
}

/// Builder for a single process execution.
pub struct Spawn {
    command: String,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl Spawn {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            current_dir: None,
            envs: Vec::new(),
        }
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn run(self, sink: &mut dyn OutputSink) -> Result<CommandResult> {
        tracing::debug!("   $ {}", self.command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::process_spawn_failed(&self.command, e.to_string()))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::process_wait_failed(
                    &self.command,
                    "stdio pipes unavailable",
                ));
            }
        };

        let mut output: Vec<u8> = Vec::new();

        // Scoped readers: both threads are joined and their pipe handles
        // dropped before this returns, on success and on error alike.
        let drained = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let tx_err = tx.clone();
            scope.spawn(move || pump(stdout, Stream::Stdout, tx));
            scope.spawn(move || pump(stderr, Stream::Stderr, tx_err));
            self.read_loop(&rx, &mut output, sink)
        });

        if let Err(err) = drained {
            let _ = child.kill();
            let _ = child.wait();
            return Err(err);
        }

        let status = child
            .wait()
            .map_err(|e| Error::process_wait_failed(&self.command, e.to_string()))?;

        Ok(CommandResult::new(
            self.command,
            exit_code(status),
            String::from_utf8_lossy(&output).into_owned(),
        ))
    }

    fn read_loop(
        &self,
        rx: &Receiver<Event>,
        output: &mut Vec<u8>,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        let mut open = 2usize;
        let mut stdout_lines = LineBuffer::default();
        let mut stderr_lines = LineBuffer::default();

        while open > 0 {
            match rx.recv() {
                Ok(Event::Data(stream, bytes)) => {
                    output.extend_from_slice(&bytes);
                    let lines = match stream {
                        Stream::Stdout => &mut stdout_lines,
                        Stream::Stderr => &mut stderr_lines,
                    };
                    lines.push(&bytes, |line| sink.line(stream, line));
                }
                Ok(Event::Closed(stream)) => {
                    let lines = match stream {
                        Stream::Stdout => &mut stdout_lines,
                        Stream::Stderr => &mut stderr_lines,
                    };
                    lines.flush(|line| sink.line(stream, line));
                    open -= 1;
                }
                Err(_) => {
                    return Err(Error::process_wait_failed(
                        &self.command,
                        "output readers stopped before end of stream",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn pump<R: Read>(mut reader: R, stream: Stream, tx: Sender<Event>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Event::Data(stream, buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            // Transient; go back to waiting on the pipe.
            Err(e) if e.kind() == ErrorKind::Interrupted || e.kind() == ErrorKind::WouldBlock => {
                continue
            }
            // A broken stream is treated as closed.
            Err(_) => break,
        }
    }
    let _ = tx.send(Event::Closed(stream));
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
