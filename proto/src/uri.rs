use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Characters left unescaped in an entry key segment. Slashes are escaped so
/// a key containing `/` is preserved verbatim as one path segment (spec.md
/// §3 "URI scheme": "keys may contain slashes and are preserved verbatim
/// after escaping").
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// A parsed `drasi://` resource URI, either a query collection or an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Query { reaction_name: String, query_id: String },
    Entry { reaction_name: String, query_id: String, entry_key: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("unsupported scheme (expected `drasi://`)")]
    UnsupportedScheme,
    #[error("malformed resource uri: {0}")]
    Malformed(String),
}

impl ResourceUri {
    pub fn query(reaction_name: impl Into<String>, query_id: impl Into<String>) -> Self {
        Self::Query { reaction_name: reaction_name.into(), query_id: query_id.into() }
    }

    pub fn entry(reaction_name: impl Into<String>, query_id: impl Into<String>, entry_key: impl Into<String>) -> Self {
        Self::Entry { reaction_name: reaction_name.into(), query_id: query_id.into(), entry_key: entry_key.into() }
    }

    pub fn query_id(&self) -> &str {
        match self {
            ResourceUri::Query { query_id, .. } => query_id,
            ResourceUri::Entry { query_id, .. } => query_id,
        }
    }

    pub fn parent_query(&self) -> ResourceUri {
        match self {
            ResourceUri::Query { .. } => self.clone(),
            ResourceUri::Entry { reaction_name, query_id, .. } => ResourceUri::Query { reaction_name: reaction_name.clone(), query_id: query_id.clone() },
        }
    }

    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let rest = uri.strip_prefix("drasi://").ok_or(UriError::UnsupportedScheme)?;
        let mut segments = rest.split('/');
        let reaction_name = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| UriError::Malformed(uri.to_string()))?;
        let kind = segments.next().ok_or_else(|| UriError::Malformed(uri.to_string()))?;
        match kind {
            "queries" => {
                let query_id = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| UriError::Malformed(uri.to_string()))?;
                if segments.next().is_some() {
                    return Err(UriError::Malformed(uri.to_string()));
                }
                Ok(ResourceUri::Query { reaction_name: reaction_name.to_string(), query_id: query_id.to_string() })
            }
            "entries" => {
                let query_id = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| UriError::Malformed(uri.to_string()))?;
                let key_segment = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| UriError::Malformed(uri.to_string()))?;
                if segments.next().is_some() {
                    return Err(UriError::Malformed(uri.to_string()));
                }
                let entry_key = percent_decode_str(key_segment)
                    .decode_utf8()
                    .map_err(|_| UriError::Malformed(uri.to_string()))?
                    .into_owned();
                Ok(ResourceUri::Entry { reaction_name: reaction_name.to_string(), query_id: query_id.to_string(), entry_key })
            }
            _ => Err(UriError::Malformed(uri.to_string())),
        }
    }

    pub fn format(&self) -> String {
        match self {
            ResourceUri::Query { reaction_name, query_id } => format!("drasi://{reaction_name}/queries/{query_id}"),
            ResourceUri::Entry { reaction_name, query_id, entry_key } => {
                let escaped = utf8_percent_encode(entry_key, KEY_SEGMENT);
                format!("drasi://{reaction_name}/entries/{query_id}/{escaped}")
            }
        }
    }
}

impl std::fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.format()) }
}
