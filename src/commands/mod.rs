mod cancel;
mod help;
mod start;
mod stats;

pub use cancel::cancel;
pub use help::help;
pub use start::start;
pub use stats::stats;
