pub mod etl;
pub mod report;

pub use crate::domain::model::{Cell, Highlight, Row, Table};
pub use crate::domain::ports::{Pipeline, RecordCount, Storage};
pub use crate::utils::error::Result;
