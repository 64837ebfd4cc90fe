//! Configuração do relaykit carregada a partir de `relaykit.toml`.
//!
//! A struct [`RelayConfig`] reúne os parâmetros de retentativa, cadência,
//! polling e HTTP. Valores ausentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `RELAYKIT_API_KEY` tem precedência sobre o arquivo.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{ConfigError, ErrorClass};
use crate::poll::PollBudget;
use crate::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "relaykit.toml";
pub const API_KEY_ENV: &str = "RELAYKIT_API_KEY";

/// Configuração de nível superior carregada de `relaykit.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayConfig {
    /// Chave enviada no cabeçalho `apikey`.
    #[serde(default)]
    pub api_key: String,

    /// URL base da API remota.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Tentativas totais por item, incluindo a primeira.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Teto do backoff em milissegundos.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Pausa entre itens consecutivos de um lote.
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// Itens em execução simultânea; 1 mantém o modo sequencial.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Espera máxima por uma vaga no rate gate.
    #[serde(default = "default_gate_max_wait_ms")]
    pub gate_max_wait_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Limite de consultas por sessão de polling. `0` remove o limite,
    /// deixando só o prazo (`poll_timeout_secs`).
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: Option<u32>,

    /// Prazo total de uma sessão de polling, em segundos.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: Option<u64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Classes de erro que nunca são retentadas.
    #[serde(default)]
    pub non_retryable: Vec<ErrorClass>,
}

// Valor padrão para a URL base: servidor local.
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

// Um segundo entre itens, como nos envios em massa.
fn default_inter_item_delay_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    1
}

fn default_gate_max_wait_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_max_attempts() -> Option<u32> {
    Some(30)
}

fn default_poll_timeout_secs() -> Option<u64> {
    Some(60)
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            inter_item_delay_ms: default_inter_item_delay_ms(),
            concurrency: default_concurrency(),
            gate_max_wait_ms: default_gate_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            non_retryable: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Carrega a configuração de `relaykit.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para a chave API.
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }

    /// Lê e valida um arquivo TOML específico, sem consultar o ambiente.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<RelayConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejeita combinações inválidas antes de qualquer execução.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_policy().validate()?;
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        self.poll_budget()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            non_retryable: self.non_retryable.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn gate_max_wait(&self) -> Duration {
        Duration::from_millis(self.gate_max_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_budget(&self) -> Result<PollBudget, ConfigError> {
        PollBudget::from_parts(
            self.poll_max_attempts.filter(|n| *n > 0),
            self.poll_timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
