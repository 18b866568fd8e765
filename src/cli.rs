//! Interface de linha de comando do bookline baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, sweep, status, users)
//! e flags globais (--config, --data, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::state_machine::JobStatus;

/// bookline: motor de ciclo de vida de reservas de tradução.
#[derive(Debug, Parser)]
#[command(name = "bookline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./bookline.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Arquivo de dados JSON; sobrescreve `data_file` da configuração.
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia o gateway HTTP e a varredura periódica.
    Serve {
        /// Endereço de escuta; sobrescreve `bind` da configuração.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Executa uma única varredura (expiração, início, alertas) e sai.
    Sweep,

    /// Mostra os jobs armazenados.
    Status {
        /// Filtra pelo status (pending, assigned, in_progress...).
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
    },

    /// Importa usuários (clientes, tradutores, admins) de um arquivo JSON.
    Users {
        /// Arquivo com uma lista JSON de usuários.
        file: PathBuf,
    },
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse()
}
