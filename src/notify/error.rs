//! Tipos de erro para a entrega de notificações.
//!
//! Define [`NotifyError`] com variantes para rate limiting, rejeição pelo
//! provedor, timeout e erros de rede. Falhas de entrega nunca desfazem a
//! transição de estado que as originou; são apenas registradas e reportadas.

use thiserror::Error;

use super::Channel;

/// Erros que podem ocorrer ao entregar uma notificação.
///
/// As variantes cobrem os cenários mais comuns de falha:
/// - [`RateLimited`](NotifyError::RateLimited): o provedor retornou HTTP 429
/// - [`Rejected`](NotifyError::Rejected): qualquer outro erro HTTP (4xx/5xx)
/// - [`Timeout`](NotifyError::Timeout): a tentativa excedeu o tempo limite do canal
/// - [`Network`](NotifyError::Network): falha na camada de rede
#[derive(Debug, Error)]
pub enum NotifyError {
    /// O destinatário não possui endereço para este canal.
    #[error("recipient has no {channel} address")]
    NoAddress { channel: Channel },

    /// Nenhum provedor configurado para o canal.
    #[error("no {channel} provider configured")]
    NotConfigured { channel: Channel },

    /// A tentativa de entrega excedeu o tempo limite.
    #[error("{channel} delivery timed out")]
    Timeout { channel: Channel },

    /// O provedor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("{channel} provider rate limited, retry after {retry_after_ms}ms")]
    RateLimited { channel: Channel, retry_after_ms: u64 },

    /// O provedor recusou a mensagem.
    /// Contém o código de status HTTP e a mensagem de erro do corpo da resposta.
    #[error("{channel} provider rejected message (status {status}): {message}")]
    Rejected {
        channel: Channel,
        status: u16,
        message: String,
    },

    /// Falha de rede subjacente (DNS, conexão recusada).
    /// Encapsula o erro original do `reqwest` via `#[from]`.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
