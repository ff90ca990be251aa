pub mod markdown;
pub mod output;

pub use output::Output;
