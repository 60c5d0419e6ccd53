//! Process-wide logger setup.
//!
//! Records go to stdout at Info unless `RUST_LOG` says otherwise. With a
//! log file configured every record is also appended there.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;

/// Writes every buffer to stdout and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

fn builder(log_file: Option<&Path>) -> Result<Builder> {
    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(Tee { file })));
        }
        None => {
            builder.target(Target::Stdout);
        }
    }
    Ok(builder)
}

/// Installs the global logger. A logger installed earlier (tests) wins.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    if builder(log_file)?.try_init().is_err() {
        log::debug!("logger already initialized");
    }
    Ok(())
}
