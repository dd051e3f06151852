use crate::domain::model::{ImageRef, ImageSourceKind};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// One external lookup for a product image.
///
/// `Ok(None)` means the lookup ran but nothing acceptable was found; `Err` means
/// the lookup itself failed. The enricher treats both as "leave unenriched".
#[async_trait]
pub trait ImageLookup: Send + Sync {
    async fn lookup(&self, product_name: &str) -> Result<Option<ImageRef>>;
}

/// A best match reported by a single image source.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub matched_name: String,
    pub score: f64,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    fn kind(&self) -> ImageSourceKind;

    async fn search(&self, product_name: &str) -> Result<Option<Candidate>>;

    /// Confidence to store for an accepted candidate, or `None` to reject it.
    fn accept(&self, candidate: &Candidate) -> Option<f64>;
}
