// whole-system clocking

use log::{debug, info};

use crate::bus::Bus;
use crate::commons::NUM_CORES;
use crate::core::Core;
use crate::memory::MainMemory;

/// The full machine: four cores behind private caches, one bus, one
/// memory. `step` advances one global cycle in a fixed order:
///
///   1. memory, observing the bus lines of the previous cycle
///   2. bus arbitration, driving this cycle's lines
///   3. every cache: snoop, fill consumption, request restating
///   4. every core pipeline
///   5. commit of the registered bus state
///
/// Memory deliberately runs before arbitration so a block response takes
/// a full cycle to become visible, while caches snoop the fresh lines.
pub struct Simulator {
    pub cores: Vec<Core>,
    pub bus: Bus,
    pub memory: MainMemory,
    cycle: u64,
}

impl Simulator {
    pub fn new(images: [Vec<u32>; NUM_CORES], memory: MainMemory) -> Self {
        let cores = images
            .into_iter()
            .enumerate()
            .map(|(id, image)| Core::new(id, image))
            .collect();
        Simulator {
            cores,
            bus: Bus::new(),
            memory,
            cycle: 0,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn done(&self) -> bool {
        self.cores.iter().all(Core::done)
    }

    /// One global cycle.
    pub fn step(&mut self) {
        self.memory.clock(&mut self.bus);
        self.bus.clock();
        for core in &mut self.cores {
            core.cache.snoop(&mut self.bus);
            core.cache.handle_bus_response(&self.bus);
            core.cache.clock(&mut self.bus);
        }
        for core in &mut self.cores {
            core.clock(&mut self.bus);
        }
        self.bus.commit();
        self.cycle += 1;
    }

    /// Run to completion, bounded by `max_cycles`. Returns false if the
    /// bound was hit first.
    pub fn run(&mut self, max_cycles: u64) -> bool {
        while !self.done() {
            if self.cycle >= max_cycles {
                debug!("cycle limit {} reached", max_cycles);
                return false;
            }
            self.step();
        }
        info!("all cores halted after {} cycles", self.cycle);
        true
    }
}
