use crate::domain::model::{DnsAnswer, Table};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn append_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove_file(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
    fn exists(&self, path: &str) -> bool;
    /// Location of `path` for messages and return values.
    fn display_path(&self, path: &str) -> String;
}

/// Number of rows/records a pipeline stage produced, for progress logs.
pub trait RecordCount {
    fn record_count(&self) -> usize;
}

impl<T> RecordCount for Vec<T> {
    fn record_count(&self) -> usize {
        self.len()
    }
}

impl RecordCount for Table {
    fn record_count(&self) -> usize {
        self.len()
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Item: Send + 'static;
    type Output: RecordCount + Send + 'static;

    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Vec<Self::Item>>;
    async fn transform(&self, data: Vec<Self::Item>) -> Result<Self::Output>;
    async fn load(&self, output: Self::Output) -> Result<String>;
}

#[async_trait]
pub trait NameserverLookup: Send + Sync {
    async fn lookup(&self, domain: &str, record_type: &str) -> Result<DnsAnswer>;

    async fn nameservers(&self, domain: &str) -> Result<Vec<String>> {
        Ok(self.lookup(domain, "NS").await?.records().to_vec())
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// `None` when the provider has no price for the ticker.
    async fn current_price(&self, ticker: &str) -> Result<Option<f64>>;
}

#[async_trait]
pub trait CnamePublisher: Send + Sync {
    /// Creates or replaces `host CNAME target`; returns the zone that holds it.
    async fn publish_cname(&self, host: &str, target: &str) -> Result<String>;
}
