use base64::prelude::{BASE64_STANDARD, Engine as _};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{RelayError, Result};

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Username and password embedded in the source address.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// `Authorization` header value for HTTP-style Basic authentication
    /// (RFC 2326 §12.5, RFC 7617).
    pub fn basic_auth(&self) -> String {
        let token = BASE64_STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed `rtsp://[user[:pass]@]host[:port]/path` source address.
///
/// Credentials are split off: requests target [`as_str`](Self::as_str),
/// which never contains them, and authenticate with a header instead.
/// [`redacted`](Self::redacted) is the form used in logs and status messages.
#[derive(Debug, Clone)]
pub struct RtspUrl {
    base: String,
    redacted: String,
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl RtspUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| RelayError::InvalidUrl(format!("{raw}: {e}")))?;

        if url.scheme() != "rtsp" {
            return Err(RelayError::InvalidUrl(format!(
                "scheme must be rtsp, got {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RelayError::InvalidUrl(format!("{raw}: missing host")))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_RTSP_PORT);

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(Credentials {
                username: percent_decode(url.username()),
                password: url.password().map(percent_decode).unwrap_or_default(),
            })
        };

        let mut bare = url.clone();
        bare.set_username("")
            .and_then(|_| bare.set_password(None))
            .map_err(|_| RelayError::InvalidUrl(format!("{raw}: cannot strip credentials")))?;

        let mut redacted = url.clone();
        if url.password().is_some() {
            redacted
                .set_password(Some("***"))
                .map_err(|_| RelayError::InvalidUrl(format!("{raw}: cannot redact password")))?;
        }

        Ok(Self {
            base: bare.as_str().to_string(),
            redacted: redacted.as_str().to_string(),
            host,
            port,
            credentials,
        })
    }

    /// The address without credentials; the target of OPTIONS/DESCRIBE/PLAY.
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// The address with its password masked.
    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, suitable for `ToSocketAddrs`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl std::fmt::Display for RtspUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted)
    }
}

/// Decode `%XX` escapes in URL userinfo. Malformed escapes pass through.
fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
