/// Logical emulation block.
///
/// Implemented by every hardware component that has a power-on state to
/// return to. Unlike the teacher's `Block`, this trait has no `cycle`
/// method: ticking happens in `Machine`-scoped free functions (one per
/// sub-scheduler), not on the component itself, since components no longer
/// own a path back to the rest of the machine.
pub trait Block {
    /// Performs a reset on the block.
    ///
    /// Afterwards the block should behave as if newly constructed in its
    /// powered-on state, except for data the model intentionally treats as
    /// persistent (battery SRAM, RTC).
    fn reset(&mut self);
}
