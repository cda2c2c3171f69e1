pub mod approval;
pub mod message;
pub mod research;
pub mod session;
