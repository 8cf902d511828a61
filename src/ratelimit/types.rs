//! Rate limiting types.

/// Rate-limit tiers, each with its own sustained ceiling (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    /// Job/export creation endpoints.
    ExportCreation,
    /// Result-download endpoints.
    Download,
    /// Everything else (listing, status, schedule/key management).
    General,
}

impl RateLimitCategory {
    /// String identifier used in Redis keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExportCreation => "export_creation",
            Self::Download => "download",
            Self::General => "general",
        }
    }
}

/// Result of a sustained+burst rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed (both windows passed).
    pub allowed: bool,
    /// Sustained-window ceiling.
    pub limit: u32,
    /// Remaining requests in the sustained window.
    pub remaining: u32,
    /// Unix timestamp when the sustained window resets.
    pub reset_at: u64,
    /// Seconds to wait before retrying (0 if allowed).
    pub retry_after: u64,
}

/// Normalized IP address stored in request extensions.
#[derive(Debug, Clone)]
pub struct NormalizedIp(pub String);
