//! Strict webhook event schema. The raw envelope is parsed once at the edge
//! and validated into a tagged [`CardEvent`] before anything dispatches on it.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub authorization: Option<ObjectRef>,
    #[serde(default)]
    pub transaction: Option<ObjectRef>,
    /// Amount in minor units (cents)
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub card_token: Option<String>,
    #[serde(default)]
    pub merchant: Option<Merchant>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AuthorizationRequest,
    AuthorizationAdvice,
    AuthorizationCapture,
    TransactionCreated,
    TransactionUpdated,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization.request" => Some(Self::AuthorizationRequest),
            "authorization.advice" => Some(Self::AuthorizationAdvice),
            "authorization.capture" => Some(Self::AuthorizationCapture),
            "transaction.created" => Some(Self::TransactionCreated),
            "transaction.updated" => Some(Self::TransactionUpdated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationRequest => "authorization.request",
            Self::AuthorizationAdvice => "authorization.advice",
            Self::AuthorizationCapture => "authorization.capture",
            Self::TransactionCreated => "transaction.created",
            Self::TransactionUpdated => "transaction.updated",
        }
    }

    /// Commit-phase events mutate debt through the queue
    pub fn is_commit(&self) -> bool {
        matches!(self, Self::AuthorizationCapture | Self::TransactionCreated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Reversed,
    Refunded,
    Other,
}

impl TransactionStatus {
    fn parse(s: &str) -> Self {
        match s {
            "REVERSED" => Self::Reversed,
            "REFUNDED" => Self::Refunded,
            _ => Self::Other,
        }
    }
}

/// Validated, typed card event.
#[derive(Debug, Clone)]
pub enum CardEvent {
    AuthorizationRequest {
        event_id: String,
        auth_id: String,
        amount_minor: u64,
        card_token: String,
        merchant: Option<Merchant>,
    },
    AuthorizationAdvice {
        event_id: String,
        auth_id: String,
        amount_minor: u64,
    },
    /// `authorization.capture` or `transaction.created`; both commit
    Capture {
        event_id: String,
        kind: EventKind,
        auth_id: String,
        amount_minor: u64,
    },
    TransactionUpdated {
        event_id: String,
        auth_id: String,
        status: TransactionStatus,
        amount_minor: u64,
    },
}

impl CardEvent {
    pub fn from_envelope(env: WebhookEnvelope) -> Result<Self, CoreError> {
        let kind = EventKind::parse(&env.event_type)
            .ok_or_else(|| CoreError::MalformedEvent(format!("unknown type {}", env.event_type)))?;

        let auth_id = env
            .data
            .authorization
            .as_ref()
            .map(|r| r.id.clone())
            .or_else(|| env.data.transaction.as_ref().map(|r| r.id.clone()))
            .ok_or_else(|| CoreError::MalformedEvent("missing authorization/transaction id".into()))?;
        let amount = env
            .data
            .amount
            .ok_or_else(|| CoreError::MalformedEvent("missing amount".into()))?;

        match kind {
            EventKind::AuthorizationRequest => {
                let card_token = env
                    .data
                    .card_token
                    .ok_or_else(|| CoreError::MalformedEvent("missing card_token".into()))?;
                Ok(CardEvent::AuthorizationRequest {
                    event_id: env.event_id,
                    auth_id,
                    amount_minor: amount,
                    card_token,
                    merchant: env.data.merchant,
                })
            }
            EventKind::AuthorizationAdvice => Ok(CardEvent::AuthorizationAdvice {
                event_id: env.event_id,
                auth_id,
                amount_minor: amount,
            }),
            EventKind::AuthorizationCapture | EventKind::TransactionCreated => {
                Ok(CardEvent::Capture {
                    event_id: env.event_id,
                    kind,
                    auth_id,
                    amount_minor: amount,
                })
            }
            EventKind::TransactionUpdated => {
                let status = env
                    .data
                    .status
                    .ok_or_else(|| CoreError::MalformedEvent("missing status".into()))?;
                Ok(CardEvent::TransactionUpdated {
                    event_id: env.event_id,
                    auth_id,
                    status: TransactionStatus::parse(&status),
                    amount_minor: amount,
                })
            }
        }
    }

    pub fn auth_id(&self) -> &str {
        match self {
            CardEvent::AuthorizationRequest { auth_id, .. }
            | CardEvent::AuthorizationAdvice { auth_id, .. }
            | CardEvent::Capture { auth_id, .. }
            | CardEvent::TransactionUpdated { auth_id, .. } => auth_id,
        }
    }

    /// The original wire event type, scoping the idempotency key
    pub fn event_type(&self) -> &'static str {
        match self {
            CardEvent::AuthorizationRequest { .. } => EventKind::AuthorizationRequest.as_str(),
            CardEvent::AuthorizationAdvice { .. } => EventKind::AuthorizationAdvice.as_str(),
            CardEvent::Capture { kind, .. } => kind.as_str(),
            CardEvent::TransactionUpdated { .. } => EventKind::TransactionUpdated.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<CardEvent, CoreError> {
        let env: WebhookEnvelope = serde_json::from_str(json).unwrap();
        CardEvent::from_envelope(env)
    }

    #[test]
    fn test_authorization_request_parses() {
        let event = parse(
            r#"{
                "event_id": "evt_1",
                "type": "authorization.request",
                "data": {
                    "authorization": {"id": "auth_1"},
                    "amount": 5000,
                    "card_token": "card_abc",
                    "merchant": {"name": "ACME", "category": "5411", "country": "US"}
                }
            }"#,
        )
        .unwrap();
        match event {
            CardEvent::AuthorizationRequest {
                auth_id,
                amount_minor,
                card_token,
                ..
            } => {
                assert_eq!(auth_id, "auth_1");
                assert_eq!(amount_minor, 5000);
                assert_eq!(card_token, "card_abc");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_capture_accepts_transaction_id() {
        let event = parse(
            r#"{
                "event_id": "evt_2",
                "type": "transaction.created",
                "data": {"transaction": {"id": "auth_1"}, "amount": 5000}
            }"#,
        )
        .unwrap();
        assert!(matches!(event, CardEvent::Capture { .. }));
        assert_eq!(event.event_type(), "transaction.created");
    }

    #[test]
    fn test_missing_card_token_rejected() {
        let err = parse(
            r#"{
                "event_id": "evt_3",
                "type": "authorization.request",
                "data": {"authorization": {"id": "auth_1"}, "amount": 100}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(_)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = parse(
            r#"{"event_id": "evt_4", "type": "card.created", "data": {"amount": 1}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(_)));
    }

    #[test]
    fn test_refund_status_parses() {
        let event = parse(
            r#"{
                "event_id": "evt_5",
                "type": "transaction.updated",
                "data": {"transaction": {"id": "auth_1"}, "amount": 3000, "status": "REFUNDED"}
            }"#,
        )
        .unwrap();
        match event {
            CardEvent::TransactionUpdated { status, .. } => {
                assert_eq!(status, TransactionStatus::Refunded)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
