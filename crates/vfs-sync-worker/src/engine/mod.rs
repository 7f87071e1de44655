mod memory;

pub use memory::MemoryEngine;
