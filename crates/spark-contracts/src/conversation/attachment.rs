use serde::{Deserialize, Serialize};

/// A user-supplied image payload, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(
        id: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_data_url(id: impl Into<String>, url: &str) -> Option<Self> {
        let (mime_type, data) = parse_data_url(url)?;
        Some(Self::new(id, mime_type, data))
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Splits `data:<mime>;base64,<payload>` into its MIME type and payload.
pub fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.trim().strip_prefix("data:")?;
    let (mime_type, data) = rest.split_once(";base64,")?;
    if mime_type.is_empty() || data.is_empty() {
        return None;
    }
    Some((mime_type.to_string(), data.to_string()))
}
