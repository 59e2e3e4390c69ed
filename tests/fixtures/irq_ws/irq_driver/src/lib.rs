// Acknowledges interrupts outside the handler context.
pub fn poll_device() {
    irq_core::eoi();
}
