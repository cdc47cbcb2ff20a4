//! Wire frames exchanged over the campaign results channel.
//!
//! Every frame is a JSON envelope `{"type": ..., "data": ...}`.

use crate::model::{CampaignStatus, Row, TargetTotals};
use serde::{Deserialize, Deserializer, Serialize};

/// Frames sent by the client, in the order they must be written after open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundFrame {
    Auth { token: String },
    SelectCampaign { campaign_id: u64 },
}

impl OutboundFrame {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Status(CampaignStatus),
    Result(HostResult),
    Totals(TargetTotals),
    Error(serde_json::Value),
    /// A frame type this client does not know about, kept by name for logging.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let Envelope { kind, data } = serde_json::from_str(raw)?;
        Ok(match kind.as_str() {
            "status" => InboundFrame::Status(serde_json::from_value(data)?),
            "result" => InboundFrame::Result(serde_json::from_value(data)?),
            "totals" => InboundFrame::Totals(serde_json::from_value(data)?),
            "error" => InboundFrame::Error(data),
            _ => InboundFrame::Unknown(kind),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostRef {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub display_name: String,
}

impl HostRef {
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.hostname
        } else {
            &self.display_name
        }
    }
}

/// One host's reply to the distributed query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostResult {
    #[serde(default)]
    pub distributed_query_execution_id: u64,
    #[serde(default)]
    pub host: HostRef,
    #[serde(default, deserialize_with = "nullable_rows")]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub error: Option<String>,
}

// The server may send `"rows": null` or null entries inside the array.
fn nullable_rows<'de, D>(deserializer: D) -> Result<Vec<Row>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = Option::<Vec<Option<Row>>>::deserialize(deserializer)?;
    Ok(rows.unwrap_or_default().into_iter().flatten().collect())
}

/// Render the payload of an `error` frame, which is usually a bare string.
pub fn error_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_frames_match_wire_shape() {
        let auth = OutboundFrame::Auth {
            token: "abc".into(),
        };
        assert_eq!(
            auth.to_text().unwrap(),
            r#"{"type":"auth","data":{"token":"abc"}}"#
        );
        let select = OutboundFrame::SelectCampaign { campaign_id: 42 };
        assert_eq!(
            select.to_text().unwrap(),
            r#"{"type":"select_campaign","data":{"campaign_id":42}}"#
        );
    }

    #[test]
    fn decodes_result_with_null_rows() {
        let raw = r#"{"type":"result","data":{"host":{"id":7,"hostname":"web-1"},"rows":[{"a":"1"},null],"error":null}}"#;
        let frame = InboundFrame::parse(raw).unwrap();
        let InboundFrame::Result(res) = frame else {
            panic!("expected result frame");
        };
        assert_eq!(res.host.id, 7);
        assert_eq!(res.host.label(), "web-1");
        assert_eq!(res.rows.len(), 1);
        assert!(res.error.is_none());

        let raw = r#"{"type":"result","data":{"host":{"id":8},"rows":null}}"#;
        let InboundFrame::Result(res) = InboundFrame::parse(raw).unwrap() else {
            panic!("expected result frame");
        };
        assert!(res.rows.is_empty());
    }

    #[test]
    fn status_totals_and_unknown() {
        let frame = InboundFrame::parse(r#"{"type":"status","data":{"status":"finished"}}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Status(ref s) if s.is_finished()));

        let frame = InboundFrame::parse(
            r#"{"type":"totals","data":{"count":3,"online":2,"offline":1,"missing_in_action":0}}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Totals(t) if t.count == 3 && t.online == 2));

        let frame = InboundFrame::parse(r#"{"type":"heartbeat","data":{}}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unknown("heartbeat".into()));

        let frame = InboundFrame::parse(r#"{"type":"error","data":"forbidden"}"#).unwrap();
        let InboundFrame::Error(v) = frame else {
            panic!("expected error frame");
        };
        assert_eq!(error_text(&v), "forbidden");
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(InboundFrame::parse("{not json").is_err());
        assert!(InboundFrame::parse(r#"{"data":{}}"#).is_err());
        assert!(InboundFrame::parse(r#"{"type":"totals","data":{"count":"many"}}"#).is_err());
    }
}
