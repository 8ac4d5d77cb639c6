// Adapters layer: concrete clients for the CA, DNS, Azure and market APIs,
// SMTP mail, the OCR command-line tools and local file storage.

pub mod azure;
pub mod digicert;
pub mod dns;
pub mod http;
pub mod mail;
pub mod market;
pub mod ocr;
pub mod sectigo;
pub mod storage;

pub use storage::LocalStorage;
