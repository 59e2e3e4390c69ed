fn main() {
    irq_core::irq_entry(&irq_core::timer::Timer);
    irq_driver::poll_device();
}
