use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadIPFormatting(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
    MissingValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// A source address was rejected. The reason is shown to the client as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid stream URL: {}", self.reason)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum SessionError {
    Validation(ValidationError),
    CapacityReached(usize),
    NotFound(String),
    Spawn(TranscoderError),
    Runtime(String),
    ManagerUnavailable,
}

impl SessionError {
    /// Text carried by the `error` frame sent back to the client.
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Validation(e) => e.to_string(),
            SessionError::CapacityReached(max) => {
                format!("Maximum number of concurrent streams ({}) reached", max)
            }
            SessionError::NotFound(id) => format!("Stream not found: {}", id),
            SessionError::Spawn(_) => "Failed to start transcoder".to_string(),
            SessionError::Runtime(reason) => format!("Stream error: {}", reason),
            SessionError::ManagerUnavailable => "Server is shutting down".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(e) => write!(f, "Validation error: {}", e),
            SessionError::CapacityReached(max) => write!(f, "Session limit reached ({})", max),
            SessionError::NotFound(id) => write!(f, "Session not found: {}", id),
            SessionError::Spawn(e) => write!(f, "Spawn error: {}", e),
            SessionError::Runtime(e) => write!(f, "Runtime error: {}", e),
            SessionError::ManagerUnavailable => write!(f, "Session manager unavailable"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ValidationError> for SessionError {
    fn from(err: ValidationError) -> Self {
        SessionError::Validation(err)
    }
}

#[derive(Debug)]
pub enum TranscoderError {
    SpawnFailed(String),
    SignalFailed(String),
}

impl fmt::Display for TranscoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscoderError::SpawnFailed(e) => write!(f, "Transcoder spawn failed: {}", e),
            TranscoderError::SignalFailed(e) => write!(f, "Transcoder signal failed: {}", e),
        }
    }
}

impl std::error::Error for TranscoderError {}

#[derive(Debug)]
pub enum StorageError {
    NotFound,
    InvalidName(String),
    InitFailed(std::io::Error),
    ReadFailed(std::io::Error),
    CleanupFailed(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "Artifact not found"),
            StorageError::InvalidName(e) => write!(f, "Invalid artifact name: {}", e),
            StorageError::InitFailed(e) => write!(f, "Storage initialization failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::CleanupFailed(e) => write!(f, "Storage cleanup failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum ConnectionError {
    LimitReached(usize),
    UnknownConnection(u64),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::LimitReached(max) => {
                write!(f, "Connection limit reached ({})", max)
            }
            ConnectionError::UnknownConnection(id) => write!(f, "Unknown connection: {}", id),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Inbound control frame that could not be decoded. `Display` is the client-facing text.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    Malformed(String),
    UnknownType(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(_) => write!(f, "Invalid message format"),
            ProtocolError::UnknownType(t) => write!(f, "Unknown message type: {}", t),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Failed to bind web server: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    BindError(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::BindError(e) => write!(f, "Bind error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        match err {
            WebError::BindFailed(e) => ControllerError::BindError(e),
        }
    }
}
