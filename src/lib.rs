pub mod pipeline;
pub mod sink;
