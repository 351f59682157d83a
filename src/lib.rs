/*
    A cycle-accurate simulator of a 4-core shared-memory multiprocessor:
    pipelined cores with private direct-mapped data caches, kept coherent
    with the MESI protocol over a single arbitrated bus and one main memory.
 */

pub mod alu;
pub mod bus;
pub mod cache;
pub mod commons;
pub mod core;
pub mod files;
pub mod memory;
pub mod pipeline;
pub mod register;
pub mod simulator;
pub mod trace;

pub use crate::bus::{Bus, BusCmd};
pub use crate::cache::{Cache, MesiState};
pub use crate::commons::Addr;
pub use crate::core::Core;
pub use crate::memory::MainMemory;
pub use crate::simulator::Simulator;
