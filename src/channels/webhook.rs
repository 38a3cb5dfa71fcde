//! Inbound-email webhook payload parsing.
//!
//! Providers send either `{ "type": ..., "data": { ... } }` or the email
//! fields flat at the top level, and `to`/`from` come as strings, objects or
//! arrays. All of that is resolved here into one `InboundEmail`; nothing
//! downstream looks at the raw shape.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::WebhookError;
use crate::extraction::numbers::lenient_string;
use crate::pipeline::types::{EmailAddress, InboundEmail, RawAttachment};

/// Fallback name for attachments delivered without one.
const UNNAMED_ATTACHMENT: &str = "attachment";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped {
        #[serde(rename = "type", default, deserialize_with = "lenient_string")]
        kind: Option<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        email_id: Option<String>,
        data: WebhookPayload,
    },
    Flat(WebhookPayload),
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default, deserialize_with = "lenient_address")]
    to: Option<AddressField>,
    #[serde(default, deserialize_with = "lenient_address")]
    from: Option<AddressField>,
    #[serde(default, deserialize_with = "lenient_string")]
    subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    html: Option<String>,
    #[serde(default, deserialize_with = "lenient_attachments")]
    attachments: Vec<AttachmentPayload>,
    #[serde(default, deserialize_with = "lenient_string")]
    email_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddressField {
    One(String),
    Object(AddressObject),
    Many(Vec<AddressEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddressEntry {
    Plain(String),
    Object(AddressObject),
}

#[derive(Debug, Deserialize)]
struct AddressObject {
    #[serde(default, alias = "email", deserialize_with = "lenient_string")]
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    #[serde(default, alias = "name", deserialize_with = "lenient_string")]
    filename: Option<String>,
    #[serde(default, alias = "contentType", deserialize_with = "lenient_string")]
    content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
}

/// Unrecognised address shapes are treated as absent.
fn lenient_address<'de, D>(deserializer: D) -> Result<Option<AddressField>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Attachment entries that are not objects are dropped.
fn lenient_attachments<'de, D>(deserializer: D) -> Result<Vec<AttachmentPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

impl AddressObject {
    fn to_address(&self) -> Option<EmailAddress> {
        let raw = self.address.as_deref()?;
        let parsed = EmailAddress::parse(raw)?;
        Some(match &self.name {
            Some(name) => EmailAddress::new(&parsed.address, Some(name)),
            None => parsed,
        })
    }
}

impl AddressEntry {
    fn to_address(&self) -> Option<EmailAddress> {
        match self {
            Self::Plain(s) => first_in_list(s),
            Self::Object(o) => o.to_address(),
        }
    }
}

impl AddressField {
    /// First usable address in the field.
    fn first(&self) -> Option<EmailAddress> {
        match self {
            Self::One(s) => first_in_list(s),
            Self::Object(o) => o.to_address(),
            Self::Many(entries) => entries.iter().find_map(AddressEntry::to_address),
        }
    }
}

/// `a@x.com, b@y.com` yields `a@x.com`.
fn first_in_list(raw: &str) -> Option<EmailAddress> {
    split_address_list(raw)
        .into_iter()
        .find_map(EmailAddress::parse)
}

/// Split on commas outside quoted names and `<...>` brackets, so
/// `"Doe, Jan" <jan@x.be>` stays one entry.
fn split_address_list(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut start, mut quoted, mut bracketed) = (0, false, false);
    for (i, c) in raw.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '<' if !quoted => bracketed = true,
            '>' if !quoted => bracketed = false,
            ',' if !quoted && !bracketed => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Parse a raw webhook body into the canonical email.
///
/// Only malformed JSON is an error. Any other shape produces an email whose
/// missing fields are empty, which the pipeline then rejects or degrades.
pub fn parse_webhook(body: &[u8]) -> Result<InboundEmail, WebhookError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidJson(e.to_string()))?;

    let (payload, envelope_email_id) = match serde_json::from_value::<Envelope>(value) {
        Ok(Envelope::Wrapped {
            kind,
            email_id,
            data,
        }) => {
            debug!(event = kind.as_deref().unwrap_or("-"), "Wrapped webhook envelope");
            (data, email_id)
        }
        Ok(Envelope::Flat(payload)) => (payload, None),
        Err(e) => {
            debug!(error = %e, "Webhook body is not an object, treating as empty");
            (WebhookPayload::default(), None)
        }
    };

    Ok(into_inbound_email(payload, envelope_email_id))
}

fn into_inbound_email(payload: WebhookPayload, envelope_email_id: Option<String>) -> InboundEmail {
    let to = payload
        .to
        .as_ref()
        .and_then(AddressField::first)
        .map(|a| a.address)
        .filter(|a| !a.is_empty());

    let from = payload
        .from
        .as_ref()
        .and_then(AddressField::first)
        .unwrap_or_default();

    let attachments = payload
        .attachments
        .into_iter()
        .map(|a| RawAttachment {
            filename: a
                .filename
                .unwrap_or_else(|| UNNAMED_ATTACHMENT.to_string()),
            content_type: a.content_type,
            content: a.content,
            provider_attachment_id: a.id,
        })
        .collect();

    InboundEmail {
        to,
        from,
        subject: payload.subject.unwrap_or_default(),
        text: payload.text,
        html: payload.html,
        attachments,
        provider_message_id: payload.email_id.or(envelope_email_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> InboundEmail {
        parse_webhook(json.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn wrapped_and_flat_envelopes_are_equivalent() {
        let data = serde_json::json!({
            "to": ["Invoices@Acme.inbox.dev"],
            "from": "billing@sigma.be",
            "subject": "Factuur 118",
            "text": "In bijlage",
            "email_id": "em_123",
            "attachments": [{"id": "att_1", "filename": "F118.pdf", "content_type": "application/pdf"}]
        });

        let wrapped = parse(serde_json::json!({"type": "email.received", "data": data.clone()}));
        let flat = parse(data);

        for email in [&wrapped, &flat] {
            assert_eq!(email.to.as_deref(), Some("invoices@acme.inbox.dev"));
            assert_eq!(email.from.address, "billing@sigma.be");
            assert_eq!(email.subject, "Factuur 118");
            assert_eq!(email.text.as_deref(), Some("In bijlage"));
            assert_eq!(email.provider_message_id.as_deref(), Some("em_123"));
            assert_eq!(email.attachments.len(), 1);
            assert_eq!(email.attachments[0].provider_attachment_id.as_deref(), Some("att_1"));
        }
    }

    #[test]
    fn quoted_display_names_may_contain_commas() {
        let email = parse(serde_json::json!({
            "to": "\"Boekhouding, Acme\" <Invoices@Acme.dev>, other@acme.dev",
            "from": "\"Doe, Jan\" <jan@x.be>"
        }));
        assert_eq!(email.to.as_deref(), Some("invoices@acme.dev"));
        assert_eq!(email.from.address, "jan@x.be");
        assert_eq!(email.from.name.as_deref(), Some("Doe, Jan"));

        assert_eq!(
            split_address_list("a@x.be, \"B, C\" <b@y.be>"),
            vec!["a@x.be", " \"B, C\" <b@y.be>"]
        );
    }

    #[test]
    fn envelope_level_email_id_is_used_as_fallback() {
        let email = parse(serde_json::json!({
            "type": "email.received",
            "email_id": "em_outer",
            "data": {"to": "a@b.dev"}
        }));
        assert_eq!(email.provider_message_id.as_deref(), Some("em_outer"));
    }

    #[test]
    fn to_accepts_string_object_arrays() {
        let as_string = parse(serde_json::json!({"to": " Inbox@Acme.dev "}));
        assert_eq!(as_string.to.as_deref(), Some("inbox@acme.dev"));

        let as_list_string = parse(serde_json::json!({"to": "first@acme.dev, second@acme.dev"}));
        assert_eq!(as_list_string.to.as_deref(), Some("first@acme.dev"));

        let as_objects = parse(serde_json::json!({
            "to": [{"address": "", "name": "Nobody"}, {"address": "Inbox@Acme.dev", "name": "Acme"}]
        }));
        assert_eq!(as_objects.to.as_deref(), Some("inbox@acme.dev"));

        let as_email_key = parse(serde_json::json!({"to": [{"email": "inbox@acme.dev"}]}));
        assert_eq!(as_email_key.to.as_deref(), Some("inbox@acme.dev"));

        let display = parse(serde_json::json!({"to": "Acme Inbox <Inbox@Acme.dev>"}));
        assert_eq!(display.to.as_deref(), Some("inbox@acme.dev"));
    }

    #[test]
    fn from_accepts_string_and_object() {
        let bare = parse(serde_json::json!({"from": "billing@sigma.be"}));
        assert_eq!(bare.from, EmailAddress::new("billing@sigma.be", None));

        let display = parse(serde_json::json!({"from": "Sigma Coatings <billing@sigma.be>"}));
        assert_eq!(display.from.name.as_deref(), Some("Sigma Coatings"));
        assert_eq!(display.from.address, "billing@sigma.be");

        let object = parse(serde_json::json!({"from": {"address": "billing@sigma.be", "name": "Sigma"}}));
        assert_eq!(object.from.name.as_deref(), Some("Sigma"));
        assert_eq!(object.from.address, "billing@sigma.be");
    }

    #[test]
    fn content_type_aliases() {
        let email = parse(serde_json::json!({
            "attachments": [
                {"filename": "a.bin", "contentType": "application/pdf", "content": "JVBERg=="},
                {"filename": "b.bin", "content_type": "application/pdf"},
                "garbage",
                {"contentType": "image/png"}
            ]
        }));
        assert_eq!(email.attachments.len(), 3);
        assert!(email.attachments[0].is_pdf());
        assert_eq!(email.attachments[0].content.as_deref(), Some("JVBERg=="));
        assert!(email.attachments[1].is_pdf());
        assert_eq!(email.attachments[2].filename, "attachment");
        assert!(!email.attachments[2].is_pdf());
    }

    #[test]
    fn missing_or_odd_fields_yield_empty_email() {
        let email = parse(serde_json::json!({"to": 42, "subject": null, "attachments": "none"}));
        assert!(email.to.is_none());
        assert!(email.from.is_empty());
        assert_eq!(email.subject, "");
        assert!(email.attachments.is_empty());

        let array_body = parse(serde_json::json!([1, 2, 3]));
        assert!(array_body.to.is_none());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse_webhook(b"{not json").unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON payload"));
    }
}
