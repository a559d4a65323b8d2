//! Provider adapters.
//!
//! One adapter per upstream event platform. Adapters extract upstream
//! responses into the canonical shapes and own every platform-specific
//! mismatch; they never touch the store, and they return whole-record errors
//! rather than partial canonical values.
//!
//! The only state an adapter holds is its cached access credential.

mod eventbrite;
mod html;
mod luma;
mod meetup;
mod registry;

use agora_core::Platform;
use agora_core::canonical::{CanonicalEvent, CanonicalGroup};
use async_trait::async_trait;
use snafu::Snafu;

pub use self::eventbrite::EventbriteAdapter;
pub use self::html::html_to_text;
pub use self::luma::LumaAdapter;
pub use self::meetup::MeetupAdapter;
pub use self::registry::ProviderRegistry;

pub(crate) const HTTP_TIMEOUT_SECS: u64 = 30;
pub(crate) const USER_AGENT: &str = concat!("agora/", env!("CARGO_PKG_VERSION"));

/// Credentials recognised by the adapters. Any missing entry makes the
/// corresponding adapter report `is_configured() == false`.
#[derive(Debug, Clone, Default)]
pub struct ProviderEnv {
    pub meetup_client_key: Option<String>,
    /// PEM-encoded RSA private key used to sign the OAuth JWT grant.
    pub meetup_signing_key: Option<String>,
    pub meetup_member_id: Option<String>,
    pub eventbrite_token: Option<String>,
    pub luma_api_key: Option<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    #[snafu(display("Upstream rate limit hit, retry after {retry_after_secs}s"))]
    RateLimited { retry_after_secs: u64 },
    #[snafu(display("Upstream rejected credentials: {message}"))]
    Authentication { message: String },
    #[snafu(display("Adapter for {platform} is not configured"))]
    NotConfigured { platform: Platform },
    #[snafu(display("Invalid platform identifier: {message}"))]
    InvalidIdentifier { message: String },
    #[snafu(display("HTTP request failed: {source}"))]
    Http { source: reqwest::Error },
    #[snafu(display("Failed to parse upstream response: {message}"))]
    Parse { message: String },
    #[snafu(display("Upstream returned status {status}: {message}"))]
    Upstream { status: u16, message: String },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            FetchError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Clone)]
pub struct FetchOpts {
    pub max_events: usize,
}

impl Default for FetchOpts {
    fn default() -> Self {
        Self { max_events: 50 }
    }
}

/// One upstream fetch, fully mapped.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub group: Option<CanonicalGroup>,
    pub events: Vec<CanonicalEvent>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn display_name(&self) -> &'static str;

    fn is_configured(&self, env: &ProviderEnv) -> bool;

    /// Perform any auth handshake and cache the credential. Idempotent: a
    /// second call with a live credential is a no-op.
    async fn initialize(&self, env: &ProviderEnv) -> FetchResult<()>;

    /// Fetch the group and its upcoming events for one platform identifier.
    async fn fetch_events(
        &self,
        platform_id: &str,
        opts: &FetchOpts,
    ) -> FetchResult<FetchOutcome>;

    /// Fetch group metadata alone, where the platform exposes it.
    async fn fetch_group(&self, platform_id: &str) -> FetchResult<Option<CanonicalGroup>>;
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}
