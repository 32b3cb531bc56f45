/// Room coordinates and limits for a [`Connector`](crate::Connector).
///
/// Peers meet only when all three of `app_id`, `room_id` and `password`
/// match. Use the builder-style setters for the optional limits:
///
/// ```rust
/// use tome_transport::RoomConfig;
///
/// let config = RoomConfig::new("tome 0.1.0", "ROOMID", "PASSWD")
///     .max_message_size(64 * 1024);
/// assert_eq!(config.room_id(), "ROOMID");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    pub(crate) app_id: String,
    pub(crate) room_id: String,
    pub(crate) password: String,
    /// Maximum outgoing payload size in bytes.
    pub(crate) max_message_size: usize,
}

/// Default payload limit (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

impl RoomConfig {
    pub fn new(
        app_id: impl Into<String>,
        room_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            room_id: room_id.into(),
            password: password.into(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set maximum payload size (default: 1 MiB).
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn message_limit(&self) -> usize {
        self.max_message_size
    }

    /// Reject configurations no transport could honour.
    pub fn validate(&self) -> Result<(), crate::TomeTransportError> {
        if self.app_id.is_empty() {
            return Err(crate::TomeTransportError::Config("empty app id".into()));
        }
        if self.max_message_size == 0 {
            return Err(crate::TomeTransportError::Config(
                "max_message_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
