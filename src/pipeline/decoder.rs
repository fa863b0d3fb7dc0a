//! Job decoder: raw message body to a validated `Job`.
//!
//! Wire contract: `{ "ticket_id": <integer|string>, "description": <string> }`.
//! Unknown fields are ignored.

use serde_json::Value;

use crate::error::PipelineError;
use crate::pipeline::types::{Job, TicketId};

/// Decode and validate a message body.
///
/// Bytes that are not JSON fail with `PipelineError::Decode`. JSON that is not
/// an object, or lacks a usable `ticket_id` / `description`, fails with
/// `PipelineError::Validation`.
pub fn decode_job(body: &[u8]) -> Result<Job, PipelineError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| PipelineError::Decode(e.to_string()))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(PipelineError::Validation(format!(
                "payload must be a JSON object, got {}",
                json_type(&other)
            )));
        }
    };

    let ticket_id = match fields.get("ticket_id") {
        None | Some(Value::Null) => {
            return Err(PipelineError::Validation("missing ticket_id".into()));
        }
        Some(v) => parse_ticket_id(v)?,
    };

    let description = match fields.get("description") {
        None | Some(Value::Null) => {
            return Err(PipelineError::Validation("missing description".into()));
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(PipelineError::Validation("empty description".into()));
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(PipelineError::Validation(format!(
                "description must be a string, got {}",
                json_type(other)
            )));
        }
    };

    Ok(Job {
        ticket_id,
        description,
    })
}

fn parse_ticket_id(value: &Value) -> Result<TicketId, PipelineError> {
    match value {
        Value::Number(n) => {
            if let Some(id) = n.as_i64() {
                Ok(TicketId::Number(id))
            } else if let Some(id) = n.as_u64() {
                // Above i64::MAX: keep the decimal form as the key.
                Ok(TicketId::Text(id.to_string()))
            } else {
                Err(PipelineError::Validation(format!(
                    "ticket_id must be an integer, got {n}"
                )))
            }
        }
        Value::String(s) if s.trim().is_empty() => {
            Err(PipelineError::Validation("empty ticket_id".into()))
        }
        Value::String(s) => Ok(TicketId::Text(s.trim().to_string())),
        other => Err(PipelineError::Validation(format!(
            "ticket_id must be an integer or string, got {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(body: &[u8]) -> &'static str {
        match decode_job(body) {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        }
    }

    #[test]
    fn decodes_numeric_ticket() {
        let job = decode_job(
            br#"{"ticket_id": 101, "description": "The printer on the 2nd floor is jamming..."}"#,
        )
        .unwrap();
        assert_eq!(job.ticket_id, TicketId::Number(101));
        assert!(job.description.starts_with("The printer"));
    }

    #[test]
    fn decodes_ticket_above_i64_range() {
        let job = decode_job(br#"{"ticket_id": 18446744073709551615, "description": "x"}"#)
            .unwrap();
        assert_eq!(job.ticket_id.as_key(), "18446744073709551615");
    }

    #[test]
    fn decodes_string_ticket_and_ignores_extra_fields() {
        let job = decode_job(
            br#"{"ticket_id": " T-42 ", "description": "Card declined", "priority": "high"}"#,
        )
        .unwrap();
        assert_eq!(job.ticket_id, TicketId::Text("T-42".into()));
        assert_eq!(job.description, "Card declined");
    }

    #[test]
    fn malformed_json_is_decode_error() {
        assert_eq!(kind(b"{not json"), "decode_error");
        assert_eq!(kind(b""), "decode_error");
        assert_eq!(kind(&[0xff, 0xfe, 0x00]), "decode_error");
    }

    #[test]
    fn missing_description_is_validation_error() {
        assert_eq!(kind(br#"{"ticket_id": 101}"#), "validation_error");
        assert_eq!(
            kind(br#"{"ticket_id": 101, "description": null}"#),
            "validation_error"
        );
    }

    #[test]
    fn empty_fields_are_validation_errors() {
        assert_eq!(
            kind(br#"{"ticket_id": 101, "description": "   "}"#),
            "validation_error"
        );
        assert_eq!(
            kind(br#"{"ticket_id": "", "description": "x"}"#),
            "validation_error"
        );
        assert_eq!(kind(br#"{"description": "x"}"#), "validation_error");
    }

    #[test]
    fn wrong_types_are_validation_errors() {
        assert_eq!(kind(br#"[1, 2, 3]"#), "validation_error");
        assert_eq!(kind(br#""just a string""#), "validation_error");
        assert_eq!(
            kind(br#"{"ticket_id": 1.5, "description": "x"}"#),
            "validation_error"
        );
        assert_eq!(
            kind(br#"{"ticket_id": true, "description": "x"}"#),
            "validation_error"
        );
        assert_eq!(
            kind(br#"{"ticket_id": 3, "description": ["x"]}"#),
            "validation_error"
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        let payloads: [&[u8]; 4] = [
            br#"{"ticket_id": 5, "description": "refund please"}"#,
            br#"{"ticket_id": 5}"#,
            b"<xml/>",
            br#"{"ticket_id": {}, "description": "x"}"#,
        ];
        for body in payloads {
            let first = decode_job(body);
            let second = decode_job(body);
            match (first, second) {
                (Ok(a), Ok(b)) => assert_eq!(a, b),
                (Err(a), Err(b)) => assert_eq!(a.kind(), b.kind()),
                _ => panic!("decode outcome changed between calls"),
            }
        }
    }
}
