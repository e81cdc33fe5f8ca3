//! Interrupt control and the nested "no-preemption" critical section.

use core::marker::PhantomData;

use crate::arch;
use crate::processor::{get_current_processor, ProcessorLocal};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    Enabled,
    Disabled,
}

impl From<InterruptState> for bool {
    fn from(value: InterruptState) -> Self {
        match value {
            InterruptState::Enabled => true,
            InterruptState::Disabled => false,
        }
    }
}

impl From<bool> for InterruptState {
    fn from(value: bool) -> Self {
        match value {
            true => InterruptState::Enabled,
            false => InterruptState::Disabled,
        }
    }
}

pub struct InterruptController;

impl InterruptController {
    #[inline]
    pub fn global_enable() {
        arch::current().enable_interrupts();
    }

    #[inline]
    pub fn global_disable() {
        arch::current().disable_interrupts();
    }

    pub fn get_state() -> InterruptState {
        arch::current().interrupts_enabled().into()
    }

    pub fn set_state(state: InterruptState) {
        match state {
            InterruptState::Enabled => Self::global_enable(),
            InterruptState::Disabled => Self::global_disable(),
        }
    }

    /// Disables interrupts and returns a guard restoring the previous state
    /// once the outermost guard is dropped.
    pub fn intr_disable_nested() -> IntrReqGuard {
        IntrReqGuard::new(get_current_processor())
    }

    /// Guard-less variant of [`intr_disable_nested`](Self::intr_disable_nested)
    /// for raw locks. Must be balanced by [`pop_off`](Self::pop_off) on the same hart.
    pub fn push_off() {
        Self::enter(get_current_processor());
    }

    pub fn pop_off() {
        Self::leave(get_current_processor());
    }

    fn enter(processor: &ProcessorLocal) {
        let old_intr_state = Self::get_state();
        Self::global_disable();

        // 0 -> 1
        if processor.increment_nest() == 0 {
            processor.set_saved_interrupt_state(old_intr_state);
        }
    }

    fn leave(processor: &ProcessorLocal) {
        // 1 -> 0
        if processor.decrement_nest() == 1 {
            Self::set_state(processor.get_saved_interrupt_state());
        }
    }
}

/// RAII guard for interrupt-disabled critical sections.
///
/// When dropped, automatically restores the previous interrupt state
/// if this is the outermost guard in a nesting chain.
pub struct IntrReqGuard {
    processor: &'static ProcessorLocal,
    // tied to the hart that disabled interrupts
    _not_send: PhantomData<*const ()>,
}

impl IntrReqGuard {
    fn new(processor: &'static ProcessorLocal) -> Self {
        InterruptController::enter(processor);
        Self {
            processor,
            _not_send: PhantomData,
        }
    }
}

impl Drop for IntrReqGuard {
    fn drop(&mut self) {
        InterruptController::leave(self.processor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_macros::kernel_test;

    #[kernel_test]
    fn nested_guards_balance_depth() {
        let processor = get_current_processor();
        let before = processor.nest_depth();
        {
            let _outer = InterruptController::intr_disable_nested();
            let _inner = InterruptController::intr_disable_nested();
            assert!(processor.nest_depth() >= before + 2);
        }
        InterruptController::push_off();
        InterruptController::pop_off();
    }
}
