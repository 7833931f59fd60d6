pub mod login;
pub mod logout;
pub mod upload;

pub use login::login;
pub use logout::logout;
pub use upload::upload;
