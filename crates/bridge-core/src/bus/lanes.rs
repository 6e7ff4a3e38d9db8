use super::MemoryAccess;
use crate::error::BusError;
use crate::protocol::AccessWidth;

/// Expands a byte strobe into a bit mask, one `0xFF` per enabled lane.
#[must_use]
pub fn byte_mask(strobe: u64) -> u64 {
    (0..8)
        .filter(|lane| (strobe >> lane) & 1 == 1)
        .fold(0, |mask, lane| mask | (0xFF << (lane * 8)))
}

/// First enabled lane and lane count when `strobe` is one unbroken run.
#[must_use]
pub const fn contiguous_run(strobe: u64) -> Option<(u32, u32)> {
    if strobe == 0 {
        return None;
    }
    let offset = strobe.trailing_zeros();
    let run = strobe >> offset;
    if run & run.wrapping_add(1) != 0 {
        return None;
    }
    Some((offset, run.count_ones()))
}

/// Strobe of a `width`-byte access starting at lane `offset`.
#[must_use]
pub const fn lane_strobe(width: AccessWidth, offset: u64) -> u64 {
    width.strobe() << offset
}

/// Pushes the strobed lanes of one bus word to the driver's memory.
///
/// A naturally aligned run of 1, 2, 4 or 8 lanes becomes a single push of
/// that width; any other pattern is merged into the current word with a
/// read-modify-write.
///
/// # Errors
///
/// Returns [`BusError::Unsupported`] for a bus width the protocol cannot
/// carry, and whatever `memory` reports for the relayed accesses.
pub fn push_lanes(
    memory: &mut dyn MemoryAccess,
    address: u64,
    bus_bytes: u8,
    value: u64,
    strobe: u64,
) -> Result<(), BusError> {
    let bus = AccessWidth::from_bytes(u64::from(bus_bytes))?;
    let strobe = strobe & bus.strobe();
    if strobe == 0 {
        return Ok(());
    }

    if let Some((offset, len)) = contiguous_run(strobe) {
        if let Ok(width) = AccessWidth::from_bytes(u64::from(len)) {
            if offset % len == 0 {
                let data = (value >> (offset * 8)) & width.mask();
                return memory.push(width, address + u64::from(offset), data);
            }
        }
    }

    let mask = byte_mask(strobe);
    let current = memory.request(bus, address)?;
    memory.push(bus, address, (current & !mask) | (value & mask))
}

/// Fetches one bus word from the driver's memory, zeroing unstrobed lanes.
///
/// # Errors
///
/// Returns [`BusError::Unsupported`] for a bus width the protocol cannot
/// carry, and whatever `memory` reports for the relayed access.
pub fn fetch_lanes(
    memory: &mut dyn MemoryAccess,
    address: u64,
    bus_bytes: u8,
    strobe: u64,
) -> Result<u64, BusError> {
    let bus = AccessWidth::from_bytes(u64::from(bus_bytes))?;
    let value = memory.request(bus, address)?;
    Ok(value & byte_mask(strobe & bus.strobe()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{byte_mask, contiguous_run, fetch_lanes, push_lanes};
    use crate::bus::testing::{MemoryOp, SparseMemory};
    use crate::protocol::AccessWidth;

    #[test]
    fn byte_mask_expands_each_lane() {
        assert_eq!(byte_mask(0b0000), 0);
        assert_eq!(byte_mask(0b0101), 0x00FF_00FF);
        assert_eq!(byte_mask(0xFF), u64::MAX);
    }

    #[rstest]
    #[case(0b0001, Some((0, 1)))]
    #[case(0b0110, Some((1, 2)))]
    #[case(0b1111, Some((0, 4)))]
    #[case(0b1100_0000, Some((6, 2)))]
    #[case(0b0101, None)]
    #[case(0, None)]
    fn runs(#[case] strobe: u64, #[case] expected: Option<(u32, u32)>) {
        assert_eq!(contiguous_run(strobe), expected);
    }

    #[rstest]
    #[case(0b0001, MemoryOp::Push(AccessWidth::Byte, 0x100, 0x44))]
    #[case(0b0100, MemoryOp::Push(AccessWidth::Byte, 0x102, 0x22))]
    #[case(0b1100, MemoryOp::Push(AccessWidth::Word, 0x102, 0x1122))]
    #[case(0b1111, MemoryOp::Push(AccessWidth::DoubleWord, 0x100, 0x1122_3344))]
    fn aligned_runs_push_once(#[case] strobe: u64, #[case] expected: MemoryOp) {
        let mut memory = SparseMemory::default();
        push_lanes(&mut memory, 0x100, 4, 0x1122_3344, strobe).expect("push");
        assert_eq!(memory.ops, vec![expected]);
    }

    #[test]
    fn scattered_lanes_read_modify_write() {
        let mut memory = SparseMemory::default();
        memory.store(AccessWidth::DoubleWord, 0x200, 0xAAAA_AAAA);

        push_lanes(&mut memory, 0x200, 4, 0x1122_3344, 0b0110).expect("rmw");

        assert_eq!(memory.load(AccessWidth::DoubleWord, 0x200), 0xAA22_33AA);
        assert_eq!(
            memory.ops,
            vec![
                MemoryOp::Request(AccessWidth::DoubleWord, 0x200),
                MemoryOp::Push(AccessWidth::DoubleWord, 0x200, 0xAA22_33AA),
            ]
        );
    }

    #[test]
    fn empty_strobe_touches_nothing() {
        let mut memory = SparseMemory::default();
        push_lanes(&mut memory, 0, 8, u64::MAX, 0).expect("noop");
        assert!(memory.ops.is_empty());
    }

    #[test]
    fn fetch_masks_unselected_lanes() {
        let mut memory = SparseMemory::default();
        memory.store(AccessWidth::DoubleWord, 0x10, 0xDEAD_BEEF);
        assert_eq!(fetch_lanes(&mut memory, 0x10, 4, 0b0011).expect("read"), 0xBEEF);
    }

    #[test]
    fn unsupported_bus_widths_are_rejected() {
        let mut memory = SparseMemory::default();
        assert!(fetch_lanes(&mut memory, 0, 3, 0b111).is_err());
    }
}
