pub mod fetch;
pub mod ml;
pub mod models;
pub mod pipeline;
pub mod utils;
