//! Binary attachments and their text-safe form.
//!
//! Card images and profile card scans are kept as raw bytes plus a MIME
//! type. In a snapshot they travel as data URLs
//! (`data:<mime>;base64,<payload>`), so the whole document is plain JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

/// MIME type assumed when a data URL carries none.
pub const FALLBACK_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Guess the MIME type from a file extension.
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "heic" => "image/heic",
            _ => "application/octet-stream",
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Parse a data URL. The MIME type falls back to [`FALLBACK_MIME`] when
    /// the header does not carry one; the payload must be valid base64.
    pub fn from_data_url(url: &str) -> Result<Self, String> {
        let (header, payload) = url
            .split_once(',')
            .ok_or_else(|| "attachment is not a data URL (missing ',')".to_string())?;

        let mime = header
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_MIME);

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| format!("attachment payload is not base64: {}", e))?;

        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }
}

impl Serialize for Attachment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Attachment::from_data_url(&raw).map_err(serde::de::Error::custom)
    }
}

/// Optional attachment field that reads anything other than a string or
/// `null` as absent. Older backups hold `{}` where a profile's card scan
/// should be (a serialized `Blob`); those documents still restore, without
/// the image. A string must still be a valid data URL.
pub fn lenient_opt<'de, D>(deserializer: D) -> Result<Option<Attachment>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(url) => Attachment::from_data_url(&url)
            .map(Some)
            .map_err(serde::de::Error::custom),
        other => {
            warn!(value = %other, "Dropping attachment that is not a data URL");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_keeps_mime_and_bytes() {
        let att = Attachment::new("image/jpeg", vec![0xff, 0xd8, 0x00, 0x10]);
        let url = att.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(Attachment::from_data_url(&url).unwrap(), att);
    }

    #[test]
    fn missing_mime_falls_back_to_png() {
        let att = Attachment::from_data_url("data:;base64,AAEC").unwrap();
        assert_eq!(att.mime, FALLBACK_MIME);
        assert_eq!(att.bytes, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_text_without_comma() {
        assert!(Attachment::from_data_url("not a data url").is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(Attachment::from_data_url("data:image/png;base64,***").is_err());
    }

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "lenient_opt")]
        image: Option<Attachment>,
    }

    #[test]
    fn lenient_field_drops_objects_but_not_bad_strings() {
        let h: Holder = serde_json::from_str(r#"{"image": {}}"#).unwrap();
        assert!(h.image.is_none());
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(h.image.is_none());
        let h: Holder = serde_json::from_str(r#"{"image": "data:image/png;base64,AAEC"}"#).unwrap();
        assert_eq!(h.image.unwrap().bytes, vec![0, 1, 2]);
        assert!(serde_json::from_str::<Holder>(r#"{"image": "nope"}"#).is_err());
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(Attachment::mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(Attachment::mime_for_extension("bin"), "application/octet-stream");
    }
}
