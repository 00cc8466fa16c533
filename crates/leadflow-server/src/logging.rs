use crate::config::Config;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_subscriber::{fmt::writer::MakeWriterExt, EnvFilter};

const LOG_FILE_NAME: &str = "leadflow-server.log";

/// Installs the global subscriber. Events go to stdout and, when `--log-dir` is set,
/// are mirrored into `leadflow-server.log` there. Returns the mirror path.
pub fn init_logging(config: &Config) -> Option<PathBuf> {
    let level = log_level(config.debug, std::env::var("LEADFLOW_LOG_LEVEL").ok());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let mirror = match open_log_file(Path::new(config.log_dir.trim())) {
        Ok(mirror) => mirror,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            None
        }
    };

    match mirror {
        Some((path, file)) => {
            let writer = io::stdout.and(Arc::new(file));
            builder
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .ok()
                .map(|_| path)
        }
        None => {
            let _ = builder.try_init();
            None
        }
    }
}

fn log_level(debug: bool, configured: Option<String>) -> String {
    if debug {
        return "debug".to_string();
    }
    configured
        .map(|level| level.trim().to_string())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn open_log_file(dir: &Path) -> io::Result<Option<(PathBuf, File)>> {
    if dir.as_os_str().is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Some((path, file)))
}
