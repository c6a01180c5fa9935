use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Used to identify a group of consumers.
pub struct ConsumerGroup {
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Used to identify a consumer within a group.
///
/// Unlike Kafka, Redis requires consumers to self-assign consumer IDs.
/// By default we use the host name, so that a restarted process picks up its own pending entries.
pub struct ConsumerId {
    id: String,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
/// Where a newly created consumer group starts consuming.
pub enum AutoStreamReset {
    /// Use `0` as ID, which replays the stream from the earliest message.
    Earliest,
    /// Use `$` as ID, which only consumes messages appended after creation.
    #[default]
    Latest,
}

impl ConsumerGroup {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ConsumerId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self { id: id.into() }
    }

    /// The host name of this machine.
    pub fn host_default() -> Self {
        Self::new(host_name())
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl AutoStreamReset {
    /// The id given to `XGROUP CREATE`.
    pub fn group_start_id(&self) -> &'static str {
        match self {
            Self::Earliest => "0",
            Self::Latest => "$",
        }
    }
}

impl Display for ConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// `HOSTNAME`, then `/etc/hostname`, then `localhost`.
pub fn host_name() -> String {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.trim().is_empty() {
            return host.trim().to_owned();
        }
    }
    if let Ok(host) = std::fs::read_to_string("/etc/hostname") {
        if !host.trim().is_empty() {
            return host.trim().to_owned();
        }
    }
    "localhost".to_owned()
}
