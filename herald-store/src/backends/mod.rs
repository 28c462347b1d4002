mod file;
mod memory;
mod test;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use test::TestStore;
