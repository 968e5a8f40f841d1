mod messages;
mod primitives;
mod record;
mod request;
mod result;

pub use messages::*;
pub use primitives::*;
pub use record::*;
pub use request::*;
pub use result::*;
