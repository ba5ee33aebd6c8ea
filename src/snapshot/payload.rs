use bytes::Bytes;
use parking_lot::RwLock;

/// Compressed envelope plus the hash of its canonical config table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadContent {
    pub bytes: Bytes,
    pub hash: String,
}

/// Current payload of one cluster.
///
/// Readers take a cheap clone of the content; `update` swaps it atomically.
#[derive(Debug, Default)]
pub struct Payload {
    inner: RwLock<Option<PayloadContent>>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &self,
        bytes: Bytes,
        hash: String,
    ) {
        *self.inner.write() = Some(PayloadContent { bytes, hash });
    }

    /// `None` until the first reconfigure
    pub fn raw(&self) -> Option<PayloadContent> {
        self.inner.read().clone()
    }

    pub fn hash(&self) -> Option<String> {
        self.inner.read().as_ref().map(|c| c.hash.clone())
    }
}
