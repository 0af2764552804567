mod media;
mod range;
mod token;
mod user;

pub use media::*;
pub use range::*;
pub use token::*;
pub use user::*;
