// edge-triggered storage cell

/// A D flip-flop: the clocked cell every register, pipeline latch and
/// multi-cycle counter in the machine is built from. `set_next` may be
/// called any number of times within a cycle; only `commit` moves the
/// proposed value into the visible one, and only while enabled. Disabling
/// a cell for one cycle is how a latch is frozen during a stall.
#[derive(Clone, Debug)]
pub struct Dff {
    q: u32,
    d: u32,
    enable: bool,
    valid: bool,
}

impl Dff {
    pub fn new() -> Self {
        Dff {
            q: 0,
            d: 0,
            enable: true,
            valid: false,
        }
    }

    pub fn with(value: u32) -> Self {
        Dff {
            q: value,
            d: value,
            enable: true,
            valid: false,
        }
    }

    /// Propose the value for the next cycle. Last write before commit wins.
    pub fn set_next(&mut self, value: u32) {
        self.d = value;
    }

    /// Clock edge: latch the proposed value if enabled.
    pub fn commit(&mut self) {
        if self.enable {
            self.q = self.d;
            self.valid = true;
        }
    }

    /// Current (committed) value.
    pub fn q(&self) -> u32 {
        self.q
    }

    pub fn set_enable(&mut self, enable: bool) {
        self.enable = enable;
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Write the visible value directly, bypassing the clock. Exists for
    /// the R1 immediate-scratch register, which is combinational by
    /// definition, and for test setup.
    pub fn poke(&mut self, value: u32) {
        self.q = value;
        self.d = value;
    }
}

impl Default for Dff {
    fn default() -> Self {
        Dff::new()
    }
}

/// A clocked latch over an arbitrary payload, with the same edge and
/// enable semantics as `Dff`. Pipeline latches carry a handful of fields
/// that always move together, so they are latched as one value.
#[derive(Clone, Debug)]
pub struct Latch<T: Copy> {
    q: T,
    d: T,
    enable: bool,
}

impl<T: Copy> Latch<T> {
    pub fn with(value: T) -> Self {
        Latch {
            q: value,
            d: value,
            enable: true,
        }
    }

    pub fn set_next(&mut self, value: T) {
        self.d = value;
    }

    pub fn commit(&mut self) {
        if self.enable {
            self.q = self.d;
        }
    }

    pub fn q(&self) -> T {
        self.q
    }

    pub fn set_enable(&mut self, enable: bool) {
        self.enable = enable;
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }
}

impl<T: Copy + Default> Default for Latch<T> {
    fn default() -> Self {
        Latch::with(T::default())
    }
}
