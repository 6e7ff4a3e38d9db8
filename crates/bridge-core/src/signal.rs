use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// One named line of the external model.
///
/// Writes become visible to other lines only after the model is evaluated.
pub trait Signal {
    /// Current value of the line.
    fn get(&self) -> u64;

    /// Drives the line.
    fn set(&self, value: u64);

    /// Whether the line reads non-zero.
    fn is_high(&self) -> bool {
        self.get() != 0
    }
}

impl<S: Signal + ?Sized> Signal for Box<S> {
    fn get(&self) -> u64 {
        (**self).get()
    }

    fn set(&self, value: u64) {
        (**self).set(value);
    }
}

impl<S: Signal + ?Sized> Signal for Rc<S> {
    fn get(&self) -> u64 {
        (**self).get()
    }

    fn set(&self, value: u64) {
        (**self).set(value);
    }
}

/// Shared-cell signal; clones observe and drive the same line.
#[derive(Clone)]
pub struct Wire {
    cell: Rc<Cell<u64>>,
    mask: u64,
}

impl Wire {
    /// Creates a line `width` bits wide, truncating every write to that width.
    ///
    /// Widths outside `1..=64` are clamped into that range.
    #[must_use]
    pub fn new(width: u32) -> Self {
        let width = width.clamp(1, 64);
        let mask = if width == 64 {
            u64::MAX
        } else {
            (1 << width) - 1
        };
        Self {
            cell: Rc::new(Cell::new(0)),
            mask,
        }
    }

    /// Creates a single-bit line.
    #[must_use]
    pub fn bit() -> Self {
        Self::new(1)
    }

    /// Mask of the bits this line can hold.
    #[must_use]
    pub const fn width_mask(&self) -> u64 {
        self.mask
    }

    /// Whether both handles drive the same line.
    #[must_use]
    pub fn same_line(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wire({:#x})", self.cell.get())
    }
}

impl Signal for Wire {
    fn get(&self) -> u64 {
        self.cell.get()
    }

    fn set(&self, value: u64) {
        self.cell.set(value & self.mask);
    }
}
