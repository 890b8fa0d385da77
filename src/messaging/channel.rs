use serde::Serialize;

/// The three logical destinations an order can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Primary,
    Retry,
    DeadLetter,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Primary => "primary",
            Channel::Retry => "retry",
            Channel::DeadLetter => "dead-letter",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binds logical channels to broker topic names.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    primary: String,
    retry: String,
    dead_letter: String,
}

impl Topology {
    pub fn new(
        primary: impl Into<String>,
        retry: impl Into<String>,
        dead_letter: impl Into<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            retry: retry.into(),
            dead_letter: dead_letter.into(),
        }
    }

    pub fn topic(&self, channel: Channel) -> &str {
        match channel {
            Channel::Primary => &self.primary,
            Channel::Retry => &self.retry,
            Channel::DeadLetter => &self.dead_letter,
        }
    }

    pub fn channel_for(&self, topic: &str) -> Option<Channel> {
        [Channel::Primary, Channel::Retry, Channel::DeadLetter]
            .into_iter()
            .find(|c| self.topic(*c) == topic)
    }

    /// Topics a worker subscribes to: primary and retry share one listener group.
    pub fn consumed_topics(&self) -> [&str; 2] {
        [&self.primary, &self.retry]
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new("orders", "orders-retry", "orders-dlq")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_for_topic() {
        let topology = Topology::default();
        assert_eq!(topology.channel_for("orders"), Some(Channel::Primary));
        assert_eq!(topology.channel_for("orders-retry"), Some(Channel::Retry));
        assert_eq!(topology.channel_for("orders-dlq"), Some(Channel::DeadLetter));
        assert_eq!(topology.channel_for("payments"), None);
    }

    #[test]
    fn test_dead_letter_is_not_consumed() {
        let topology = Topology::new("a", "b", "c");
        assert_eq!(topology.consumed_topics(), ["a", "b"]);
    }
}
