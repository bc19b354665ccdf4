pub mod params;
pub mod work;
pub mod job;
pub mod record;
pub mod errors;

pub use params::*;
pub use work::*;
pub use job::*;
pub use record::*;
pub use errors::*;
