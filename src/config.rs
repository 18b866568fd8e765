//! Configuração do bookline carregada a partir de `bookline.toml`.
//!
//! A struct [`BookingConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `ADMIN_ROLE_ID`, `SUPERADMIN_ROLE_ID` e
//! `BOOKLINE_NOTIFY_API_KEY` têm precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::auth::Role;

/// Arquivo procurado no diretório atual quando `--config` não é informado.
pub const DEFAULT_CONFIG_FILE: &str = "bookline.toml";

/// Configuração de nível superior carregada de `bookline.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Endereço em que o gateway HTTP escuta.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Arquivo JSON onde jobs, distâncias e usuários são persistidos.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Formato dos logs: "compact" ou "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default)]
    pub roles: RoleConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

// Valor padrão para o endereço: 127.0.0.1:8080.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

// Valor padrão para o arquivo de dados: bookline.json.
fn default_data_file() -> PathBuf {
    PathBuf::from("bookline.json")
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_file: default_data_file(),
            log_format: default_log_format(),
            roles: RoleConfig::default(),
            lifecycle: LifecycleConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Identificadores numéricos de tipo de usuário enviados pelo gateway de autenticação.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub customer: u32,
    pub translator: u32,
    pub admin: u32,
    pub superadmin: u32,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            customer: 1,
            translator: 2,
            admin: 3,
            superadmin: 4,
        }
    }
}

impl RoleConfig {
    /// Converte o `user_type` numérico no [`Role`] correspondente.
    pub fn resolve(&self, user_type: u32) -> Option<Role> {
        if user_type == self.superadmin {
            Some(Role::Superadmin)
        } else if user_type == self.admin {
            Some(Role::Admin)
        } else if user_type == self.translator {
            Some(Role::Translator)
        } else if user_type == self.customer {
            Some(Role::Customer)
        } else {
            None
        }
    }
}

/// Parâmetros de política do ciclo de vida dos jobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minutos entre a criação de um job imediato e o seu horário.
    pub immediate_lead_minutes: i64,
    /// Cancelamentos a menos de N horas do horário são marcados como tardios.
    pub late_cancel_hours: i64,
    /// Novo horário (em horas a partir de agora) para jobs reabertos já vencidos.
    pub reopen_lead_hours: i64,
    /// Se definido, jobs marcados como "cliente não ligou" são cancelados após N minutos.
    pub no_show_grace_minutes: Option<i64>,
    /// Intervalo da varredura periódica em segundos.
    pub sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            immediate_lead_minutes: 5,
            late_cancel_hours: 24,
            reopen_lead_hours: 24,
            no_show_grace_minutes: None,
            sweep_interval_secs: 60,
        }
    }
}

/// Endpoints dos provedores de push, SMS e e-mail.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub push_url: Option<String>,
    pub sms_url: Option<String>,
    pub email_url: Option<String>,
    pub api_key: String,
    /// Tempo máximo por tentativa de entrega, em milissegundos.
    pub timeout_ms: u64,
    /// Destinatário dos alertas administrativos.
    pub admin_email: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            push_url: None,
            sms_url: None,
            email_url: None,
            api_key: String::new(),
            timeout_ms: 5000,
            admin_email: None,
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Verdadeiro quando pelo menos um provedor HTTP está configurado.
    pub fn has_gateway(&self) -> bool {
        self.push_url.is_some() || self.sms_url.is_some() || self.email_url.is_some()
    }
}

impl BookingConfig {
    /// Carrega a configuração do caminho informado ou de `bookline.toml`.
    /// Usa valores padrão se o arquivo padrão não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("config file not found: {}", p.display());
                }
                Self::from_file(p)?
            }
            None => {
                let p = Path::new(DEFAULT_CONFIG_FILE);
                if p.exists() {
                    Self::from_file(p)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str::<BookingConfig>(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ADMIN_ROLE_ID") {
            self.roles.admin = v
                .trim()
                .parse()
                .with_context(|| format!("ADMIN_ROLE_ID is not a number: {v:?}"))?;
        }
        if let Some(v) = lookup("SUPERADMIN_ROLE_ID") {
            self.roles.superadmin = v
                .trim()
                .parse()
                .with_context(|| format!("SUPERADMIN_ROLE_ID is not a number: {v:?}"))?;
        }
        if let Some(key) = lookup("BOOKLINE_NOTIFY_API_KEY")
            && !key.is_empty()
        {
            self.notifications.api_key = key;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let r = &self.roles;
        let ids = [r.customer, r.translator, r.admin, r.superadmin];
        for (i, id) in ids.iter().enumerate() {
            if ids[i + 1..].contains(id) {
                bail!("role ids must be distinct, {id} is used twice");
            }
        }
        if self.notifications.timeout_ms == 0 {
            bail!("notifications.timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let config = BookingConfig::default();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.roles.admin, 3);
        assert_eq!(config.roles.superadmin, 4);
        assert_eq!(config.lifecycle.immediate_lead_minutes, 5);
        assert_eq!(config.notifications.timeout_ms, 5000);
        assert!(!config.notifications.has_gateway());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            bind = "0.0.0.0:9000"

            [roles]
            admin = 10

            [notifications]
            sms_url = "http://sms.local/send"
        "#;
        let config: BookingConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.roles.admin, 10);
        assert_eq!(config.roles.customer, 1);
        assert_eq!(config.lifecycle.late_cancel_hours, 24);
        assert!(config.notifications.has_gateway());
        assert_eq!(config.data_file, PathBuf::from("bookline.json"));
    }

    #[test]
    fn env_overrides_role_ids() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ADMIN_ROLE_ID", "7"),
            ("SUPERADMIN_ROLE_ID", " 8 "),
            ("BOOKLINE_NOTIFY_API_KEY", "secret"),
        ]);
        let mut config = BookingConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.roles.admin, 7);
        assert_eq!(config.roles.superadmin, 8);
        assert_eq!(config.notifications.api_key, "secret");
        assert_eq!(config.roles.resolve(8), Some(Role::Superadmin));
    }

    #[test]
    fn env_rejects_non_numeric_role() {
        let mut config = BookingConfig::default();
        let result = config.apply_env(|k| (k == "ADMIN_ROLE_ID").then(|| "admin".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_role_ids_are_rejected() {
        let mut config = BookingConfig::default();
        config.roles.admin = config.roles.customer;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_user_types() {
        let roles = RoleConfig::default();
        assert_eq!(roles.resolve(1), Some(Role::Customer));
        assert_eq!(roles.resolve(2), Some(Role::Translator));
        assert_eq!(roles.resolve(3), Some(Role::Admin));
        assert_eq!(roles.resolve(99), None);
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let result = BookingConfig::load(Some(Path::new("/nonexistent/bookline.toml")));
        assert!(result.is_err());
    }
}
