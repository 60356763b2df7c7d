//! Invoice repository implementations.

mod file;
mod memory;

pub use file::JsonFileInvoiceRepository;
pub use memory::InMemoryInvoiceRepository;
