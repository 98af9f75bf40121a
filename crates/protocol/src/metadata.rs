use serde::{Deserialize, Serialize};

/// User-metadata keys shared between stored objects and transport headers.
///
/// Outbound, a self-describing object carries its own routing under these
/// keys; inbound, the transport's per-message headers are written back as
/// object metadata under the same names.
pub mod meta {
    pub const FROM: &str = "mbx-from";
    pub const TO: &str = "mbx-to";
    pub const WORKFLOW_ID: &str = "mbx-workflowid";
    pub const FILENAME: &str = "mbx-filename";
    pub const SUBJECT: &str = "mbx-subject";
    pub const LOCAL_ID: &str = "mbx-localid";
    pub const PARTNER_ID: &str = "mbx-partnerid";
    pub const CONTENT_COMPRESS: &str = "mbx-content-compress";
    pub const CONTENT_COMPRESSED: &str = "mbx-content-compressed";
    pub const CONTENT_ENCRYPTED: &str = "mbx-content-encrypted";
    pub const CONTENT_CHECKSUM: &str = "mbx-content-checksum";
    pub const MESSAGE_TYPE: &str = "mbx-messagetype";
    pub const STATUS_CODE: &str = "mbx-statuscode";
    pub const STATUS_DESCRIPTION: &str = "mbx-statusdescription";
    pub const STATUS_SUCCESS: &str = "mbx-statussuccess";
}

/// Kind of an inbound message, declared by the transport.
///
/// Anything the transport labels other than `REPORT` is treated as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Data,
    Report,
}

impl MessageType {
    /// Parses the transport's message-type header, case-insensitively.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("REPORT") => MessageType::Report,
            _ => MessageType::Data,
        }
    }
}

/// Lenient boolean parsing for metadata overrides.
///
/// Accepts the usual spellings in either case; anything else is `None` so
/// callers can fall back to their default rather than fail the transfer.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Some(true),
        "no" | "false" | "f" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_from_header() {
        assert_eq!(MessageType::from_header(Some("REPORT")), MessageType::Report);
        assert_eq!(MessageType::from_header(Some("report")), MessageType::Report);
        assert_eq!(MessageType::from_header(Some(" Report ")), MessageType::Report);
        assert_eq!(MessageType::from_header(Some("DATA")), MessageType::Data);
        assert_eq!(MessageType::from_header(Some("anything")), MessageType::Data);
        assert_eq!(MessageType::from_header(None), MessageType::Data);
    }

    #[test]
    fn parse_bool_spellings() {
        for v in ["yes", "TRUE", "t", "Y", "1"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["no", "False", "f", "N", "0"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
