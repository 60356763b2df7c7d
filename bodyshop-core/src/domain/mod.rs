pub mod invoice;
pub mod retry;
pub mod session;
