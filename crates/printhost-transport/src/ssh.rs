//! SSH-tunneled serial transport
//!
//! Reaches a serial device attached to a remote host through the
//! system OpenSSH client. The remote terminal is put into raw mode with
//! `stty`; non-standard baud rates are applied by compiling and running
//! a small C helper on the remote host (the same `TCGETS2`/`TCSETS2`
//! ioctl pair the local factory uses). Data then flows through two
//! independent remote shells, one running `cat <device>` and one
//! running `cat > <device>`. Each shell echoes a sentinel line first,
//! which is read and discarded to confirm the remote side is ready.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use printhost_core::{CancelToken, Result, TransportError};

use crate::alias::Alias;
use crate::device::{Device, DeviceFactory, DeviceInfo};

/// Line each remote shell prints before the byte stream starts
const SENTINEL: &str = "PRINTHOST-READY";

/// Remote path the baud helper is written to
const HELPER_PATH: &str = "/tmp/printhost-setbaud";

/// C source of the remote baud override helper
const HELPER_SOURCE: &str = r#"
#include <fcntl.h>
#include <stdio.h>
#include <stdlib.h>
#include <sys/ioctl.h>
#include <asm/termbits.h>

int main(int argc, char **argv) {
    struct termios2 tio;
    int fd, baud;
    if (argc != 3) { fprintf(stderr, "usage: setbaud <device> <baud>\n"); return 2; }
    baud = atoi(argv[2]);
    fd = open(argv[1], O_RDWR | O_NOCTTY);
    if (fd < 0) { perror("open"); return 1; }
    if (ioctl(fd, TCGETS2, &tio) != 0) { perror("TCGETS2"); return 1; }
    tio.c_cflag &= ~(CBAUD | CBAUDEX);
    tio.c_cflag |= BOTHER;
    tio.c_ispeed = baud;
    tio.c_ospeed = baud;
    if (ioctl(fd, TCSETS2, &tio) != 0) { perror("TCSETS2"); return 1; }
    close(fd);
    return 0;
}
"#;

/// Baud rates `stty` accepts everywhere
const STANDARD_BAUDS: &[u32] = &[
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000,
    1500000, 2000000,
];

/// Connection parameters for one remote host
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote host name or address.
    pub host: String,
    /// Login user; the client default when `None`.
    pub user: Option<String>,
    /// SSH port.
    pub port: u16,
    /// Remote C compiler used for the baud helper; skipped when `None`.
    pub compiler: Option<String>,
}

impl SshConfig {
    /// Create a config with client defaults
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: 22,
            compiler: Some("cc".to_string()),
        }
    }
}

/// Factory for serial MCUs attached to a remote host
pub struct SshFactory {
    config: SshConfig,
    aliases: Vec<Alias>,
}

impl SshFactory {
    /// Create a factory for `config` resolving the given aliases
    pub fn new(config: SshConfig, aliases: Vec<Alias>) -> Self {
        Self { config, aliases }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-T")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(self.config.port.to_string());
        if let Some(user) = &self.config.user {
            cmd.arg("-l").arg(user);
        }
        cmd.arg(&self.config.host);
        cmd
    }

    /// Run one remote command to completion, returning its stdout
    fn run_remote(&self, remote: &str) -> Result<String> {
        let output = self
            .base_command()
            .arg(remote)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TransportError::AuthFailed {
                host: self.config.host.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // OpenSSH reserves 255 for connection/authentication failure.
            if output.status.code() == Some(255) {
                return Err(TransportError::AuthFailed {
                    host: self.config.host.clone(),
                    reason: stderr,
                }
                .into());
            }
            return Err(TransportError::RemoteCommand {
                command: remote.to_string(),
                reason: stderr,
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Spawn one long-lived remote shell with piped stdin/stdout
    fn spawn_session(&self, remote: &str) -> Result<Child> {
        self.base_command()
            .arg(remote)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TransportError::AuthFailed {
                    host: self.config.host.clone(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Configure the remote terminal and apply the requested baud
    fn prepare_device(&self, info: &DeviceInfo) -> Result<()> {
        let stty_baud = nearest_standard_baud(info.baud);
        self.run_remote(&format!(
            "stty -F {} {} raw -echo -echoe -echok -echoctl -echoke",
            info.endpoint, stty_baud
        ))?;

        if info.baud != stty_baud {
            let Some(compiler) = &self.config.compiler else {
                return Err(TransportError::UnsupportedBaudRate {
                    baud: info.baud,
                    endpoint: info.endpoint.clone(),
                }
                .into());
            };
            self.run_remote(&format!(
                "cat > {path}.c <<'PRINTHOST_EOF'\n{src}\nPRINTHOST_EOF\n{cc} -o {path} {path}.c",
                path = HELPER_PATH,
                src = HELPER_SOURCE,
                cc = compiler,
            ))?;
            self.run_remote(&format!("{} {} {}", HELPER_PATH, info.endpoint, info.baud))?;
        }
        Ok(())
    }
}

impl DeviceFactory for SshFactory {
    fn device_names(&self, cancel: &CancelToken) -> Result<Vec<DeviceInfo>> {
        let mut infos = Vec::new();
        for alias in &self.aliases {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }
            // `ls` performs the wildcard expansion remotely; a pattern
            // matching nothing is not an error during enumeration.
            let listing = self.run_remote(&format!("ls -1 {} 2>/dev/null || true", alias.pattern))?;
            for path in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
                infos.push(DeviceInfo::new(&alias.name, path, alias.baud));
            }
        }
        Ok(infos)
    }

    fn open(&self, info: &DeviceInfo, cancel: &CancelToken) -> Result<Box<dyn Device>> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        self.prepare_device(info)?;

        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let mut reader = self.spawn_session(&format!(
            "echo {}; exec cat {}",
            SENTINEL, info.endpoint
        ))?;
        let mut writer = self.spawn_session(&format!(
            "echo {}; exec cat > {}",
            SENTINEL, info.endpoint
        ))?;

        let reader_out = reader.stdout.take().ok_or_else(|| TransportError::Io {
            reason: "reader session has no stdout".to_string(),
        })?;
        let mut reader_out = BufReader::new(reader_out);
        discard_sentinel(&mut reader_out, &info.endpoint)?;

        let writer_out = writer.stdout.take().ok_or_else(|| TransportError::Io {
            reason: "writer session has no stdout".to_string(),
        })?;
        discard_sentinel(&mut BufReader::new(writer_out), &info.endpoint)?;

        let writer_in = writer.stdin.take().ok_or_else(|| TransportError::Io {
            reason: "writer session has no stdin".to_string(),
        })?;

        tracing::info!(
            "Opened {} on {} at {} baud over SSH",
            info.endpoint,
            self.config.host,
            info.baud
        );
        Ok(Box::new(SshDevice {
            reader,
            writer,
            reader_out,
            writer_in,
            name: info.name.clone(),
        }))
    }
}

/// Read and discard the remote shell's sentinel line
fn discard_sentinel<R: BufRead>(out: &mut R, endpoint: &str) -> Result<()> {
    let mut line = String::new();
    let n = out.read_line(&mut line).map_err(TransportError::from)?;
    if n == 0 || line.trim() != SENTINEL {
        return Err(TransportError::FailedToOpen {
            endpoint: endpoint.to_string(),
            reason: format!("remote shell not ready (got {:?})", line.trim()),
        }
        .into());
    }
    Ok(())
}

/// Closest rate `stty` can express without exceeding the requested one
fn nearest_standard_baud(baud: u32) -> u32 {
    if STANDARD_BAUDS.contains(&baud) {
        return baud;
    }
    STANDARD_BAUDS
        .iter()
        .copied()
        .filter(|&b| b <= baud)
        .max()
        .unwrap_or(STANDARD_BAUDS[0])
}

/// Serial device reached through two SSH `cat` sessions
struct SshDevice {
    reader: Child,
    writer: Child,
    reader_out: BufReader<ChildStdout>,
    writer_in: ChildStdin,
    name: String,
}

impl Device for SshDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader_out
            .read(buf)
            .map_err(|e| TransportError::from(e).into())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer_in
            .write_all(data)
            .map_err(|e| TransportError::from(e).into())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer_in
            .flush()
            .map_err(|e| TransportError::from(e).into())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SshDevice {
    fn drop(&mut self) {
        let _ = self.reader.kill();
        let _ = self.writer.kill();
        let _ = self.reader.wait();
        let _ = self.writer.wait();
    }
}
