mod health;
mod history;
mod scenario;
mod validate;

pub use health::*;
pub use history::*;
pub use scenario::*;
pub use validate::*;
