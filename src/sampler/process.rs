// Per-process bandwidth via an external tool (nettop-style CSV output).
// Best-effort: a missing, failing or slow tool yields a SamplerError, never a panic.

use super::{ProcessBandwidthSource, ProcessCounterSample, ProcessCounters, SamplerError, unix_now};
use crate::config::ProcessSamplerConfig;
use std::collections::HashMap;
use std::io::{self, ErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::instrument;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct CommandProcessSampler {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProcessSampler {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ProcessSamplerConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Run the tool, killing it once the timeout elapses.
    fn run(&self) -> Result<String, SamplerError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    SamplerError::Unavailable(format!("{} not found", self.command))
                }
                ErrorKind::PermissionDenied => {
                    SamplerError::PermissionDenied(format!("cannot execute {}", self.command))
                }
                _ => SamplerError::Io(e),
            })?;

        let Some(mut stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(SamplerError::Unavailable("stdout not captured".into()));
        };
        // Drain on a separate thread so a full pipe cannot stall the child.
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).map(|_| buf)
        });

        let status = wait_with_deadline(&mut child, self.timeout)?;

        let output = reader
            .join()
            .map_err(|_| SamplerError::Unavailable("output reader panicked".into()))??;
        if !status.success() {
            return Err(SamplerError::Unavailable(format!(
                "{} exited with {}",
                self.command, status
            )));
        }
        Ok(output)
    }
}

/// The part of `std::process::Child` the deadline loop drives.
trait Supervised {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl Supervised for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Poll until the child exits. On timeout or a failed poll the child is killed and reaped.
fn wait_with_deadline(
    child: &mut impl Supervised,
    timeout: Duration,
) -> Result<ExitStatus, SamplerError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                reap(child);
                return Err(SamplerError::Timeout(timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                reap(child);
                return Err(SamplerError::Io(e));
            }
        }
    }
}

fn reap(child: &mut impl Supervised) {
    let _ = child.kill();
    let _ = child.wait();
}

impl ProcessBandwidthSource for CommandProcessSampler {
    #[instrument(skip(self), fields(sampler = "process", operation = "sample", command = %self.command))]
    fn sample(&mut self) -> Result<ProcessCounterSample, SamplerError> {
        let output = self.run()?;
        Ok(ProcessCounterSample {
            timestamp: unix_now(),
            counters: parse_output(&output),
        })
    }
}

/// Parse `name.pid,bytes_in,bytes_out,` lines. Header, separator and malformed lines are skipped.
pub(crate) fn parse_output(output: &str) -> HashMap<u32, ProcessCounters> {
    let mut counters = HashMap::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(",bytes_in") || line.contains("===") {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 3 {
            continue;
        }
        // Process names may themselves contain dots; the pid is after the last one.
        let Some((_, pid)) = parts[0].trim().rsplit_once('.') else {
            continue;
        };
        let (Ok(pid), Some(bytes_in), Some(bytes_out)) = (
            pid.parse::<u32>(),
            parse_bytes(parts[1]),
            parse_bytes(parts[2]),
        ) else {
            continue;
        };
        counters.insert(
            pid,
            ProcessCounters {
                bytes_in,
                bytes_out,
            },
        );
    }
    counters
}

/// Empty fields count as zero; fractional values are truncated.
fn parse_bytes(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() {
        return Some(0);
    }
    field.parse::<u64>().ok().or_else(|| {
        field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}
