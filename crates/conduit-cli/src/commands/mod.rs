pub mod stream;
pub mod token;

pub use stream::StreamCommand;
pub use token::TokenCommand;
