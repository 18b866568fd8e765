//! Inicialização do `tracing-subscriber`.
//!
//! `RUST_LOG` tem precedência; sem ela o nível é `info`, ou `debug` com
//! `--verbose`. Bibliotecas ruidosas ficam em `warn`.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Formato das linhas de log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Texto compacto para terminal.
    Compact,
    /// JSON Lines, um evento por linha.
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

// Monta o filtro padrão quando RUST_LOG não está definida.
fn default_filter(verbose: bool) -> Result<EnvFilter> {
    let level = if verbose { "debug" } else { "info" };
    let directives = [
        format!("bookline={level}"),
        format!("tower_http={level}"),
        "hyper=warn".to_string(),
        "reqwest=warn".to_string(),
        "info".to_string(),
    ]
    .join(",");
    EnvFilter::try_new(&directives).map_err(|e| anyhow!("invalid log filter {directives:?}: {e}"))
}

/// Instala o subscriber global. Deve ser chamada uma única vez, no início do `main`.
pub fn init(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(verbose)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
