//! Environment configuration.
//!
//! Provider credentials are all optional; a platform whose credentials are
//! missing simply reports unconfigured and is skipped by sync. The two
//! non-provider secrets are validated for shape at startup so a deployment
//! mistake surfaces immediately instead of at first use.

use agora_providers::ProviderEnv;
use base64::Engine as _;
use snafu::Snafu;
use tracing::info;

const LOG_TARGET: &str = "agora::config";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("TOKEN_CIPHER_KEY must be base64: {source}"))]
    CipherKeyEncoding { source: base64::DecodeError },
    #[snafu(display("TOKEN_CIPHER_KEY must decode to 32 bytes, got {len}"))]
    CipherKeyLength { len: usize },
    #[snafu(display("OIDC_PRIVATE_JWK must be JSON: {source}"))]
    OidcJwk { source: serde_json::Error },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub provider_env: ProviderEnv,
    /// 32-byte symmetric key for OAuth-token storage (consumed by the auth
    /// layer, validated here).
    pub token_cipher_key: Option<[u8; 32]>,
    /// Private JWK for OIDC issuance (consumed by the auth layer).
    pub oidc_private_jwk: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> ConfigResult<Self> {
        let provider_env = ProviderEnv {
            meetup_client_key: env_var("MEETUP_CLIENT_KEY"),
            meetup_signing_key: env_var("MEETUP_SIGNING_KEY"),
            meetup_member_id: env_var("MEETUP_MEMBER_ID"),
            eventbrite_token: env_var("EVENTBRITE_PRIVATE_TOKEN"),
            luma_api_key: env_var("LUMA_API_KEY"),
        };

        let token_cipher_key = env_var("TOKEN_CIPHER_KEY")
            .map(|raw| {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(raw.as_bytes())
                    .map_err(|source| ConfigError::CipherKeyEncoding { source })?;
                let len = decoded.len();
                <[u8; 32]>::try_from(decoded).map_err(|_| ConfigError::CipherKeyLength { len })
            })
            .transpose()?;

        let oidc_private_jwk = env_var("OIDC_PRIVATE_JWK")
            .map(|raw| {
                serde_json::from_str::<serde_json::Value>(&raw)
                    .map(|_| raw)
                    .map_err(|source| ConfigError::OidcJwk { source })
            })
            .transpose()?;

        let config = Self {
            provider_env,
            token_cipher_key,
            oidc_private_jwk,
        };

        info!(
            target: LOG_TARGET,
            meetup = config.provider_env.meetup_client_key.is_some(),
            eventbrite = config.provider_env.eventbrite_token.is_some(),
            luma = config.provider_env.luma_api_key.is_some(),
            token_cipher = config.token_cipher_key.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::*;

    #[test]
    fn cipher_key_shape_is_validated() {
        let good = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(good.as_bytes())
            .expect("decodes");
        assert_eq!(decoded.len(), 32);

        let short = base64::engine::general_purpose::STANDARD.encode([7u8; 16]);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(short.as_bytes())
            .expect("decodes");
        assert!(<[u8; 32]>::try_from(decoded).is_err());
    }
}
