pub mod quote;
pub mod rates;
pub mod refresh;
pub mod setup;
pub mod stats;
pub mod summary;
pub mod ui;
