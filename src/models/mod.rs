pub mod brand;
pub mod proxy;

pub use brand::*;
pub use proxy::*;
