use crate::constant::DEFAULT_PORT;
use crate::error::Error;

/// A configuration for connection
///
/// ```rs
/// let mut opts1 = Opts::default();
/// opts1.port = 29015;
///
/// let mut opts2 = Opts::try_from("rethinkdb://localhost:28015/heroes");
/// ```
#[derive(Debug, Clone)]
pub struct Opts {
    /// Enable TCP_NODELAY socket option to disable Nagle's algorithm
    pub tcp_nodelay: bool,

    /// Hostname or IP address (IPv4 and IPv6 both resolve)
    pub host: String,

    /// Port number for the server
    pub port: u16,

    /// Pre-shared secret sent during the handshake (empty when unset)
    pub auth_key: Option<String>,

    /// Default database tag carried by the connection handle
    pub db: Option<String>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            host: String::new(),
            port: DEFAULT_PORT,
            auth_key: None,
            db: None,
        }
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(url: &str) -> Result<Self, Self::Error> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::BadConfigError(format!("Failed to parse connection URL: {}", e)))?;

        if parsed.scheme() != "rethinkdb" {
            return Err(Error::BadConfigError(format!(
                "Invalid URL scheme '{}', expected 'rethinkdb'",
                parsed.scheme()
            )));
        }

        let host = parsed.host_str().unwrap_or_default().to_string();
        let port = parsed.port().unwrap_or(DEFAULT_PORT);

        // The protocol has no notion of a user; the URL password slot carries
        // the pre-shared auth secret.
        let mut auth_key = parsed.password().filter(|p| !p.is_empty()).map(ToString::to_string);

        let db = parsed
            .path()
            .strip_prefix('/')
            .filter(|db| !db.is_empty())
            .map(ToString::to_string);

        let mut tcp_nodelay = true;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "auth_key" => auth_key = Some(value.into_owned()),
                "tcp_nodelay" => tcp_nodelay = parse_bool(&key, &value)?,
                _ => {
                    return Err(Error::BadConfigError(format!("Unknown query parameter '{}'", key)));
                }
            }
        }

        Ok(Self {
            tcp_nodelay,
            host,
            port,
            auth_key,
            db,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" => Ok(true),
        "false" | "False" | "0" => Ok(false),
        _ => Err(Error::BadConfigError(format!(
            "Invalid boolean value '{}' for parameter '{}'",
            value, key
        ))),
    }
}
