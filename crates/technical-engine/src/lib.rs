pub mod fusion;
pub mod indicators;
pub mod levels;
pub mod momentum;
pub mod patterns;
pub mod snapshot;
pub mod trend;


pub use fusion::*;
pub use indicators::*;
pub use levels::*;
pub use momentum::*;
pub use patterns::*;
pub use snapshot::*;
pub use trend::*;
