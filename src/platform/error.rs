//! Platform error types.

#[derive(Debug)]
pub enum PlatformError {
    /// The client could not be constructed: no remote, unparseable remote
    /// URL, or no token available.
    NotConfigured(String),
    /// Retries exhausted against network failures, 5xx, or rate limits.
    Unreachable { attempts: u32, last_error: String },
    /// 401/403 from the platform.
    Forbidden { status: u16, message: String },
    /// Any other non-success API response.
    Api { status: u16, message: String },
    /// Response body could not be decoded.
    Decode(String),
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::NotConfigured(msg) => {
                write!(f, "platform client not configured: {msg}")
            }
            PlatformError::Unreachable { attempts, last_error } => {
                write!(f, "platform unreachable after {attempts} attempts: {last_error}")
            }
            PlatformError::Forbidden { status, message } => {
                write!(f, "platform rejected credentials ({status}): {message}")
            }
            PlatformError::Api { status, message } => {
                write!(f, "platform API error ({status}): {message}")
            }
            PlatformError::Decode(msg) => write!(f, "failed to decode platform response: {msg}"),
        }
    }
}

impl std::error::Error for PlatformError {}
