/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Broker client abstraction and message decoding.

use async_trait::async_trait;
use serde::Deserialize;

use super::offsets::OffsetCommitter;
use crate::error::ConsumerError;
use crate::models::TupleEvent;

pub const OPERATION_HEADER: &str = "operation";
pub const TXID_HEADER: &str = "txid";

/// A message received from the outbox topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Broker client used by [`super::InventoryConsumer`].
///
/// Implementations deliver rebalance events to the
/// [`super::RebalanceHandler`] they were built with.
#[async_trait]
pub trait EventConsumer: OffsetCommitter {
    fn subscribe(&self, topics: &[&str]) -> Result<(), ConsumerError>;

    /// Waits for the next message. Recoverable broker errors are returned
    /// as [`ConsumerError::Broker`].
    async fn recv(&self) -> Result<ConsumerMessage, ConsumerError>;

    fn close(&self) -> Result<(), ConsumerError>;

    fn is_closed(&self) -> bool;

    /// Whether the last revocation happened involuntarily.
    fn assignment_lost(&self) -> bool;
}

/// The two headers every outbox message carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeaders {
    pub operation: String,
    pub txid: String,
}

impl MessageHeaders {
    /// Extracts the required headers, ignoring any others.
    ///
    /// Both headers must be present; only `operation` must be non-empty.
    pub fn parse(headers: &[(String, Vec<u8>)]) -> Result<Self, ConsumerError> {
        let mut operation = None;
        let mut txid = None;
        for (key, value) in headers {
            let value = String::from_utf8_lossy(value).into_owned();
            match key.as_str() {
                OPERATION_HEADER => operation = Some(value),
                TXID_HEADER => txid = Some(value),
                _ => {}
            }
        }

        match (operation, txid) {
            (Some(operation), Some(txid)) if !operation.is_empty() => {
                Ok(Self { operation, txid })
            }
            (operation, txid) => Err(ConsumerError::InvalidHeaders(format!(
                "operation={:?} txid={:?}",
                operation, txid
            ))),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    payload: T,
}

/// Decodes a tuple event from a message value, with or without the
/// connector's `{"schema": ..., "payload": ...}` envelope.
pub fn parse_tuple_event(value: &[u8]) -> Result<TupleEvent, ConsumerError> {
    let json: serde_json::Value = serde_json::from_slice(value)?;
    if json.get("payload").is_some_and(|p| p.is_object()) {
        let envelope: Envelope<TupleEvent> = serde_json::from_value(json)?;
        Ok(envelope.payload)
    } else {
        Ok(serde_json::from_value(json)?)
    }
}

/// Decodes the inventory id from a message key.
pub fn parse_message_key(key: &[u8]) -> Result<String, ConsumerError> {
    let json: serde_json::Value = serde_json::from_slice(key)?;
    match json {
        serde_json::Value::String(id) => Ok(id),
        other => {
            let envelope: Envelope<String> = serde_json::from_value(other)?;
            Ok(envelope.payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(key: &str, value: &str) -> (String, Vec<u8>) {
        (key.to_string(), value.as_bytes().to_vec())
    }

    #[test]
    fn test_headers_require_operation_and_txid() {
        let parsed = MessageHeaders::parse(&[
            header("operation", "created"),
            header("txid", "tx-1"),
            header("extra", "ignored"),
        ])
        .unwrap();
        assert_eq!(parsed.operation, "created");
        assert_eq!(parsed.txid, "tx-1");

        let empty_txid =
            MessageHeaders::parse(&[header("operation", "updated"), header("txid", "")]).unwrap();
        assert!(empty_txid.txid.is_empty());

        assert!(MessageHeaders::parse(&[header("operation", "created")]).is_err());
        assert!(MessageHeaders::parse(&[header("operation", ""), header("txid", "tx")]).is_err());
    }

    #[test]
    fn test_parse_enveloped_and_bare_tuple_events() {
        let tuple = json!({
            "reporter_resource_key": {
                "local_resource_id": "host-1",
                "reporter_type": "hbi",
                "resource_type": "host",
                "reporter_instance_id": "i-1"
            },
            "operation_type": "created",
            "common_version": 0,
            "reporter_representation_version": 0,
            "workspace_id": "ws-1"
        });
        let enveloped = json!({"schema": {}, "payload": tuple.clone()});

        let a = parse_tuple_event(enveloped.to_string().as_bytes()).unwrap();
        let b = parse_tuple_event(tuple.to_string().as_bytes()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.workspace_id, "ws-1");
    }

    #[test]
    fn test_parse_message_key() {
        let key = json!({"schema": {}, "payload": "0191-abc"}).to_string();
        assert_eq!(parse_message_key(key.as_bytes()).unwrap(), "0191-abc");
        assert!(parse_message_key(b"not json").is_err());
    }
}
