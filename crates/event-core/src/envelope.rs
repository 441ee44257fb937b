//! 总线信封与消息 key

use serde::{Deserialize, Serialize};
use threads_errors::{AppError, AppResult};
use uuid::Uuid;

use crate::{EventType, TypedEvent};

/// 总线上传输的事件信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// 下游去重使用的事件 ID
    pub event_id: Uuid,
    pub event_type: String,
    /// 已序列化的强类型事件
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl EventEnvelope {
    pub fn new(event_id: Uuid, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AppError::codec(format!("Failed to serialize envelope: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| AppError::codec(format!("Failed to parse envelope: {}", e)))?;
        if envelope.event_type.is_empty() {
            return Err(AppError::codec("Envelope event_type is empty"));
        }
        Ok(envelope)
    }

    /// 解码为指定类型的事件
    pub fn decode<E: TypedEvent>(&self) -> AppResult<E> {
        if self.event_type != E::EVENT_TYPE.as_str() {
            return Err(AppError::codec(format!(
                "Envelope carries {} but {} was expected",
                self.event_type,
                E::EVENT_TYPE
            )));
        }
        E::decode(&self.payload)
    }
}

/// 消息 key：`<event_type>:<routing_hint>`
///
/// routing_hint 对本层不透明，可以包含 `:`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    pub event_type: String,
    pub routing_hint: String,
}

impl MessageKey {
    pub fn new(event_type: impl Into<String>, routing_hint: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            routing_hint: routing_hint.into(),
        }
    }

    pub fn parse(key: &str) -> AppResult<Self> {
        match key.split_once(':') {
            Some((event_type, routing_hint)) if !event_type.is_empty() => {
                Ok(Self::new(event_type, routing_hint))
            }
            _ => Err(AppError::codec(format!("Invalid message key format: {:?}", key))),
        }
    }

    /// 解析事件类型
    pub fn event_type(&self) -> AppResult<EventType> {
        self.event_type.parse()
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.event_type, self.routing_hint)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LikeCreated, UserFollowed};
    use chrono::Utc;

    #[test]
    fn test_key_keeps_colons_in_hint() {
        let key = MessageKey::parse("user.followed:tenant:42").unwrap();
        assert_eq!(key.event_type, "user.followed");
        assert_eq!(key.routing_hint, "tenant:42");
        assert_eq!(key.event_type().unwrap(), EventType::UserFollowed);
        assert_eq!(key.to_string(), "user.followed:tenant:42");
    }

    #[test]
    fn test_key_without_separator_is_rejected() {
        assert!(MessageKey::parse("user.followed").is_err());
        assert!(MessageKey::parse(":42").is_err());
    }

    #[test]
    fn test_envelope_payload_is_base64_on_the_wire() {
        let event = UserFollowed {
            user_id: 1,
            following_id: 2,
            followed_at: Utc::now(),
        };
        let envelope = EventEnvelope::new(Uuid::now_v7(), "user.followed", event.encode().unwrap());

        let wire: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert!(wire["payload"].is_string());

        let parsed = EventEnvelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.decode::<UserFollowed>().unwrap(), event);
    }

    #[test]
    fn test_decode_checks_event_type() {
        let envelope = EventEnvelope::new(Uuid::now_v7(), "user.followed", b"{}".to_vec());
        let err = envelope.decode::<LikeCreated>().unwrap_err();
        assert!(matches!(err, AppError::Codec(_)));
    }

    #[test]
    fn test_envelope_requires_event_type() {
        let raw = br#"{"event_id":"0190b6c4-9c4e-7cc4-8d0a-6f1f4f2b3c11","event_type":"","payload":""}"#;
        assert!(EventEnvelope::from_bytes(raw).is_err());
    }
}
