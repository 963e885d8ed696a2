use bytes::Bytes;

/// A storable cache payload.
///
/// `Null` is the explicit cached-absence marker: it records that a lookup was
/// performed and found nothing, which is different from no entry existing at
/// all. At the `get` boundary the three states are therefore
/// `None` (no entry), `Some(CacheValue::Null)` (cached absence) and
/// `Some(CacheValue::Bytes(_))` (a real payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Null,
    Bytes(Bytes),
}

impl CacheValue {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        CacheValue::Bytes(data.into())
    }

    pub fn text(data: impl Into<String>) -> Self {
        CacheValue::Bytes(Bytes::from(data.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Null)
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            CacheValue::Null => None,
            CacheValue::Bytes(data) => Some(data),
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            CacheValue::Null => None,
            CacheValue::Bytes(data) => Some(data),
        }
    }
}

impl From<Bytes> for CacheValue {
    fn from(data: Bytes) -> Self {
        CacheValue::Bytes(data)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(data: Vec<u8>) -> Self {
        CacheValue::Bytes(Bytes::from(data))
    }
}

impl From<&str> for CacheValue {
    fn from(data: &str) -> Self {
        CacheValue::text(data)
    }
}
