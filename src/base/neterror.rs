use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailedTo { host: String, port: u16, reason: String },
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Could not resolve {domain}: {reason}")]
    NameNotResolvedFor { domain: String, reason: String },
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Bad SSL client auth cert")]
    BadSslClientAuthCert,
    #[error("SSL client auth cert bad format")]
    SslClientAuthCertBadFormat,
    #[error("SSL client auth cert no private key")]
    SslClientAuthCertNoPrivateKey,
    #[error("SSL server cert bad format")]
    SslServerCertBadFormat,

    // URL Errors
    #[error("Invalid URL")]
    InvalidUrl,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed | NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved | NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError => -107,
            NetError::AddressInvalid => -108,
            NetError::BadSslClientAuthCert => -117,
            NetError::SslClientAuthCertNoPrivateKey => -135,
            NetError::SslClientAuthCertBadFormat => -164,
            NetError::SslServerCertBadFormat => -167,
            NetError::InvalidUrl => -300,
            NetError::Unknown(code) => *code,
        }
    }

    /// Connection failure with the target host and port attached.
    pub fn connection_failed_to(host: &str, port: u16, err: std::io::Error) -> Self {
        NetError::ConnectionFailedTo { host: host.to_string(), port, reason: err.to_string() }
    }

    /// Resolution failure with the looked-up domain attached.
    pub fn dns_failed(domain: &str, err: std::io::Error) -> Self {
        NetError::NameNotResolvedFor { domain: domain.to_string(), reason: err.to_string() }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -108 => NetError::AddressInvalid,
            -117 => NetError::BadSslClientAuthCert,
            -135 => NetError::SslClientAuthCertNoPrivateKey,
            -164 => NetError::SslClientAuthCertBadFormat,
            -167 => NetError::SslServerCertBadFormat,
            -300 => NetError::InvalidUrl,
            _ => NetError::Unknown(code),
        }
    }
}
