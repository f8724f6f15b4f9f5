//! Series import and trace export.

pub mod export;
pub mod import;
