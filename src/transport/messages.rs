//! Messages sent from a client channel to the registry
use serde::{Deserialize, Serialize};

use crate::registry::InstanceSnapshot;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OutboundMessage {
    Register(InstanceSnapshot),
    Heartbeat,
    Unregister,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Register(_) => "register",
            OutboundMessage::Heartbeat => "heartbeat",
            OutboundMessage::Unregister => "unregister",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::instance::{InstanceInfo, InstanceStatus};

    #[test]
    fn register_roundtrips_through_json() {
        let instance = InstanceInfo::new(
            "host-a:payments:8080".to_string(),
            "payments".to_string(),
            "host-a".to_string(),
            8080,
        );
        instance.set_status(InstanceStatus::Up);
        let message = OutboundMessage::Register(instance.snapshot());

        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: OutboundMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.kind(), "register");
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(OutboundMessage::Heartbeat.kind(), "heartbeat");
        assert_eq!(OutboundMessage::Unregister.kind(), "unregister");
    }
}
