pub mod alert;
pub mod enums;
pub mod patient;
pub mod session;

pub use alert::*;
pub use patient::*;
pub use session::*;
